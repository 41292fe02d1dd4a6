use crate::model::id::{ReservationId, RoomId};
use chrono::{DateTime, Utc};
use shared::error::{AppError, AppResult};

pub mod event;

/// 予約の時間帯。半開区間 [start, end) として扱い、end > start を常に保証する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Period {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<Self> {
        if end <= start {
            return Err(AppError::UnprocessableEntity(
                "reservation end must be after its start".into(),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// 2 つの時間帯が重なるかどうか。
    /// [a_start, a_end) と [b_start, b_end) は
    /// a_start < b_end かつ a_end > b_start のときに限り重なる。
    /// 端点が一致するだけ（11:00 終了と 11:00 開始など）は重なりではない。
    pub fn overlaps(&self, other: &Period) -> bool {
        self.start < other.end && self.end > other.start
    }
}

#[derive(Debug)]
pub struct Reservation {
    pub id: ReservationId,
    pub responsible: String,
    pub period: Period,
    pub description: Option<String>,
    pub coffee_requested: bool,
    pub coffee_quantity: Option<i32>,
    pub coffee_note: Option<String>,
    pub room: ReservationRoom,
}

#[derive(Debug)]
pub struct ReservationRoom {
    pub id: RoomId,
    pub name: String,
    pub location: String,
    pub is_active: bool,
}
