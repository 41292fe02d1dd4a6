use crate::model::id::{ReservationId, RoomId};
use crate::model::reservation::Period;
use chrono::{DateTime, Utc};
use derive_new::new;

#[derive(Debug, new)]
pub struct CreateReservation {
    pub room_id: RoomId,
    pub responsible: String,
    pub period: Period,
    pub description: Option<String>,
    pub coffee_requested: bool,
    pub coffee_quantity: Option<i32>,
    pub coffee_note: Option<String>,
}

// 部分更新イベント。Some のフィールドだけを書き換え、None は現在値を維持する。
// room_id / start / end のいずれかが Some の場合のみ重複チェックを再実行する。
#[derive(Debug, new)]
pub struct UpdateReservation {
    pub reservation_id: ReservationId,
    pub room_id: Option<RoomId>,
    pub responsible: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub coffee_requested: Option<bool>,
    pub coffee_quantity: Option<i32>,
    pub coffee_note: Option<String>,
}

impl UpdateReservation {
    /// 予約の部屋・時間帯に触れる更新かどうか。
    pub fn touches_schedule(&self) -> bool {
        self.room_id.is_some() || self.start.is_some() || self.end.is_some()
    }
}

#[derive(Debug, new)]
pub struct DeleteReservation {
    pub reservation_id: ReservationId,
}

#[derive(Debug, Default, new)]
pub struct ReservationListOptions {
    pub room_id: Option<RoomId>,
    pub responsible: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}
