use crate::model::{
    id::{ReservationId, RoomId},
    reservation::{
        event::{CreateReservation, DeleteReservation, ReservationListOptions, UpdateReservation},
        Period, Reservation,
    },
};
use async_trait::async_trait;
use shared::error::AppResult;

#[cfg_attr(feature = "mock", mockall::automock)]
#[async_trait]
pub trait ReservationRepository: Send + Sync {
    // 予約を作成する。重複チェックを通過した場合のみ永続化される。
    async fn create(&self, event: CreateReservation) -> AppResult<ReservationId>;
    // 予約を部分更新する。時間帯・部屋に触れる場合は自身を除いて重複チェックを再実行する。
    async fn update(&self, event: UpdateReservation) -> AppResult<()>;
    async fn delete(&self, event: DeleteReservation) -> AppResult<()>;
    async fn find_by_id(&self, reservation_id: ReservationId) -> AppResult<Option<Reservation>>;
    async fn find_all(&self, options: ReservationListOptions) -> AppResult<Vec<Reservation>>;
    // 指定の時間帯が既存予約と重なるかどうかだけを返す読み取り専用のチェック。
    async fn has_conflict(
        &self,
        room_id: RoomId,
        period: Period,
        exclude: Option<ReservationId>,
    ) -> AppResult<bool>;
}
