use chrono::{DateTime, Utc};
use kernel::model::{
    id::{ReservationId, RoomId},
    reservation::{Period, Reservation, ReservationRoom},
};
use shared::error::AppError;

// 予約一覧・詳細の取得に使う型。rooms と INNER JOIN した結果を受ける。
#[derive(sqlx::FromRow)]
pub struct ReservationRow {
    pub reservation_id: ReservationId,
    pub room_id: RoomId,
    pub responsible: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub description: Option<String>,
    pub coffee_requested: bool,
    pub coffee_quantity: Option<i32>,
    pub coffee_note: Option<String>,
    pub room_name: String,
    pub room_location: String,
    pub room_is_active: bool,
}

impl TryFrom<ReservationRow> for Reservation {
    type Error = AppError;

    fn try_from(value: ReservationRow) -> Result<Self, Self::Error> {
        let ReservationRow {
            reservation_id,
            room_id,
            responsible,
            start_at,
            end_at,
            description,
            coffee_requested,
            coffee_quantity,
            coffee_note,
            room_name,
            room_location,
            room_is_active,
        } = value;
        Ok(Reservation {
            id: reservation_id,
            responsible,
            period: Period::new(start_at, end_at)?,
            description,
            coffee_requested,
            coffee_quantity,
            coffee_note,
            room: ReservationRoom {
                id: room_id,
                name: room_name,
                location: room_location,
                is_active: room_is_active,
            },
        })
    }
}

// 重複チェックのスキャンに使う型。時間帯だけを読む。
#[derive(sqlx::FromRow)]
pub struct ReservationSlotRow {
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}

// 部分更新のマージ元になる現在値
#[derive(sqlx::FromRow)]
pub struct ReservationRecordRow {
    pub reservation_id: ReservationId,
    pub room_id: RoomId,
    pub responsible: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub description: Option<String>,
    pub coffee_requested: bool,
    pub coffee_quantity: Option<i32>,
    pub coffee_note: Option<String>,
}
