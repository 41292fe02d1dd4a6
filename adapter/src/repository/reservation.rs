use crate::database::{
    model::reservation::{ReservationRecordRow, ReservationRow, ReservationSlotRow},
    ConnectionPool,
};
use async_trait::async_trait;
use derive_new::new;
use kernel::model::{
    id::{ReservationId, RoomId},
    reservation::{
        event::{CreateReservation, DeleteReservation, ReservationListOptions, UpdateReservation},
        Period, Reservation,
    },
};
use kernel::repository::reservation::ReservationRepository;
use shared::error::{AppError, AppResult};
use sqlx::PgExecutor;

// Postgres の serialization_failure (SQLSTATE)
const SERIALIZATION_FAILURE: &str = "40001";
// SERIALIZABLE トランザクションが衝突した際の再試行回数の上限
const MAX_WRITE_ATTEMPTS: u32 = 3;

#[derive(new)]
pub struct ReservationRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl ReservationRepository for ReservationRepositoryImpl {
    // 予約操作を行う
    //
    // チェックと INSERT は SERIALIZABLE トランザクションで囲む。
    // 同じ部屋への同時書き込みは片方が serialization failure になるため、
    // その場合はトランザクション全体を再実行する。再実行時には勝った側の
    // コミット済みレコードが見えるので、負けた側は重複エラーで落ちる。
    // 二重予約が両方コミットされることはない。
    async fn create(&self, event: CreateReservation) -> AppResult<ReservationId> {
        let mut attempts = 0;
        loop {
            match self.try_create(&event).await {
                Err(e) if is_serialization_failure(&e) && attempts < MAX_WRITE_ATTEMPTS => {
                    attempts += 1;
                }
                other => return other,
            }
        }
    }

    // 予約の部分更新を行う
    async fn update(&self, event: UpdateReservation) -> AppResult<()> {
        let mut attempts = 0;
        loop {
            match self.try_update(&event).await {
                Err(e) if is_serialization_failure(&e) && attempts < MAX_WRITE_ATTEMPTS => {
                    attempts += 1;
                }
                other => return other,
            }
        }
    }

    async fn delete(&self, event: DeleteReservation) -> AppResult<()> {
        let res = sqlx::query("DELETE FROM reservations WHERE reservation_id = $1")
            .bind(event.reservation_id)
            .execute(self.db.inner_ref())
            .await
            .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::EntityNotFound(format!(
                "reservation ({}) was not found",
                event.reservation_id
            )));
        }

        Ok(())
    }

    async fn find_by_id(&self, reservation_id: ReservationId) -> AppResult<Option<Reservation>> {
        let row: Option<ReservationRow> = sqlx::query_as(
            r#"
                SELECT
                    r.reservation_id,
                    r.room_id,
                    r.responsible,
                    r.start_at,
                    r.end_at,
                    r.description,
                    r.coffee_requested,
                    r.coffee_quantity,
                    r.coffee_note,
                    rm.name AS room_name,
                    rm.location AS room_location,
                    rm.is_active AS room_is_active
                FROM reservations AS r
                INNER JOIN rooms AS rm ON r.room_id = rm.room_id
                WHERE r.reservation_id = $1
            "#,
        )
        .bind(reservation_id)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        row.map(Reservation::try_from).transpose()
    }

    async fn find_all(&self, options: ReservationListOptions) -> AppResult<Vec<Reservation>> {
        let rows: Vec<ReservationRow> = sqlx::query_as(
            r#"
                SELECT
                    r.reservation_id,
                    r.room_id,
                    r.responsible,
                    r.start_at,
                    r.end_at,
                    r.description,
                    r.coffee_requested,
                    r.coffee_quantity,
                    r.coffee_note,
                    rm.name AS room_name,
                    rm.location AS room_location,
                    rm.is_active AS room_is_active
                FROM reservations AS r
                INNER JOIN rooms AS rm ON r.room_id = rm.room_id
                WHERE ($1::uuid IS NULL OR r.room_id = $1)
                  AND ($2::text IS NULL OR r.responsible ILIKE '%' || $2 || '%')
                  AND ($3::timestamptz IS NULL OR r.start_at >= $3)
                  AND ($4::timestamptz IS NULL OR r.end_at <= $4)
                ORDER BY r.start_at DESC
            "#,
        )
        .bind(options.room_id.map(|id| id.raw()))
        .bind(options.responsible)
        .bind(options.from)
        .bind(options.until)
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        rows.into_iter().map(Reservation::try_from).collect()
    }

    // 読み取り専用の重複チェック。書き込みは伴わない。
    async fn has_conflict(
        &self,
        room_id: RoomId,
        period: Period,
        exclude: Option<ReservationId>,
    ) -> AppResult<bool> {
        find_overlapping(self.db.inner_ref(), room_id, period, exclude).await
    }
}

impl ReservationRepositoryImpl {
    async fn try_create(&self, event: &CreateReservation) -> AppResult<ReservationId> {
        let mut tx = self.db.begin().await?;

        set_transaction_serializable(&mut tx).await?;

        // 事前のチェックとして、以下を調べる。
        // - 指定の部屋 ID をもつ部屋が存在し、予約を受け付ける状態か
        // - 希望の時間帯が既存予約と重なっていないか
        check_room_accepts_reservations(&mut *tx, event.room_id).await?;

        if find_overlapping(&mut *tx, event.room_id, event.period, None).await? {
            return Err(AppError::ReservationConflict {
                start: event.period.start(),
                end: event.period.end(),
            });
        }

        let reservation_id = ReservationId::new();
        let res = sqlx::query(
            r#"
                INSERT INTO reservations
                (reservation_id, room_id, responsible, start_at, end_at,
                 description, coffee_requested, coffee_quantity, coffee_note)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(reservation_id)
        .bind(event.room_id)
        .bind(event.responsible.as_str())
        .bind(event.period.start())
        .bind(event.period.end())
        .bind(event.description.as_deref())
        .bind(event.coffee_requested)
        .bind(event.coffee_quantity)
        .bind(event.coffee_note.as_deref())
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "no reservation record has been created".into(),
            ));
        }

        tx.commit().await.map_err(AppError::TransactionError)?;

        Ok(reservation_id)
    }

    async fn try_update(&self, event: &UpdateReservation) -> AppResult<()> {
        let mut tx = self.db.begin().await?;

        set_transaction_serializable(&mut tx).await?;

        let current: Option<ReservationRecordRow> = sqlx::query_as(
            r#"
                SELECT reservation_id, room_id, responsible, start_at, end_at,
                       description, coffee_requested, coffee_quantity, coffee_note
                FROM reservations
                WHERE reservation_id = $1
            "#,
        )
        .bind(event.reservation_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        let Some(current) = current else {
            return Err(AppError::EntityNotFound(format!(
                "reservation ({}) was not found",
                event.reservation_id
            )));
        };

        // 指定されたフィールドだけを現在値の上にマージする
        let room_id = event.room_id.unwrap_or(current.room_id);
        let period = Period::new(
            event.start.unwrap_or(current.start_at),
            event.end.unwrap_or(current.end_at),
        )?;

        // 部屋・時間帯が変わる更新だけ、自身を除いて重複チェックをやり直す
        if event.touches_schedule() {
            if event.room_id.is_some() {
                check_room_accepts_reservations(&mut *tx, room_id).await?;
            }
            if find_overlapping(&mut *tx, room_id, period, Some(event.reservation_id)).await? {
                return Err(AppError::ReservationConflict {
                    start: period.start(),
                    end: period.end(),
                });
            }
        }

        let responsible = event
            .responsible
            .clone()
            .unwrap_or_else(|| current.responsible.clone());
        let description = event.description.clone().or(current.description.clone());
        let coffee_requested = event.coffee_requested.unwrap_or(current.coffee_requested);
        let coffee_quantity = event.coffee_quantity.or(current.coffee_quantity);
        let coffee_note = event.coffee_note.clone().or(current.coffee_note.clone());

        let res = sqlx::query(
            r#"
                UPDATE reservations
                SET room_id = $2,
                    responsible = $3,
                    start_at = $4,
                    end_at = $5,
                    description = $6,
                    coffee_requested = $7,
                    coffee_quantity = $8,
                    coffee_note = $9,
                    updated_at = CURRENT_TIMESTAMP
                WHERE reservation_id = $1
            "#,
        )
        .bind(event.reservation_id)
        .bind(room_id)
        .bind(responsible)
        .bind(period.start())
        .bind(period.end())
        .bind(description)
        .bind(coffee_requested)
        .bind(coffee_quantity)
        .bind(coffee_note)
        .execute(&mut *tx)
        .await
        .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::NoRowsAffectedError(
                "no reservation record has been updated".into(),
            ));
        }

        tx.commit().await.map_err(AppError::TransactionError)
    }
}

// create / update でのトランザクション分離レベルを SERIALIZABLE にする
async fn set_transaction_serializable(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
) -> AppResult<()> {
    sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
        .execute(&mut **tx)
        .await
        .map_err(AppError::SpecificOperationError)?;
    Ok(())
}

// 部屋が存在し、予約を受け付ける状態であることを確認する
async fn check_room_accepts_reservations<'a, E>(executor: E, room_id: RoomId) -> AppResult<()>
where
    E: PgExecutor<'a>,
{
    let row: Option<(bool,)> = sqlx::query_as("SELECT is_active FROM rooms WHERE room_id = $1")
        .bind(room_id)
        .fetch_optional(executor)
        .await
        .map_err(AppError::SpecificOperationError)?;

    match row {
        None => Err(AppError::EntityNotFound(format!(
            "room ({room_id}) was not found"
        ))),
        Some((false,)) => Err(AppError::UnprocessableEntity(format!(
            "room ({room_id}) is not accepting reservations"
        ))),
        Some((true,)) => Ok(()),
    }
}

// 指定の部屋の既存予約を走査し、時間帯が重なるものが存在するかを返す。
// exclude が指定された場合はその予約自身をチェック対象から外す（更新時用）。
// どの予約と重なったかまでは返さない。存在の有無だけを見る。
async fn find_overlapping<'a, E>(
    executor: E,
    room_id: RoomId,
    period: Period,
    exclude: Option<ReservationId>,
) -> AppResult<bool>
where
    E: PgExecutor<'a>,
{
    let slots: Vec<ReservationSlotRow> = sqlx::query_as(
        r#"
            SELECT start_at, end_at
            FROM reservations
            WHERE room_id = $1
              AND ($2::uuid IS NULL OR reservation_id <> $2)
        "#,
    )
    .bind(room_id)
    .bind(exclude.map(|id| id.raw()))
    .fetch_all(executor)
    .await
    .map_err(AppError::SpecificOperationError)?;

    for slot in slots {
        let existing = Period::new(slot.start_at, slot.end_at)?;
        if period.overlaps(&existing) {
            return Ok(true);
        }
    }

    Ok(false)
}

fn is_serialization_failure(err: &AppError) -> bool {
    let (AppError::TransactionError(e) | AppError::SpecificOperationError(e)) = err else {
        return false;
    };
    e.as_database_error()
        .and_then(|db_err| db_err.code())
        .map(|code| code == SERIALIZATION_FAILURE)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::room::RoomRepositoryImpl;
    use chrono::{DateTime, TimeZone, Utc};
    use kernel::model::room::event::CreateRoom;
    use kernel::repository::room::RoomRepository;
    use std::sync::Arc;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, min, 0).unwrap()
    }

    fn period(start: (u32, u32), end: (u32, u32)) -> Period {
        Period::new(at(start.0, start.1), at(end.0, end.1)).unwrap()
    }

    fn create_event(room_id: RoomId, p: Period) -> CreateReservation {
        CreateReservation::new(room_id, "Alice".into(), p, None, false, None, None)
    }

    async fn fixture_room(pool: &sqlx::PgPool, is_active: bool) -> anyhow::Result<RoomId> {
        let repo = RoomRepositoryImpl::new(ConnectionPool::new(pool.clone()));
        let room_id = repo
            .create(CreateRoom::new(
                format!("Room {}", RoomId::new()),
                "3F".into(),
                Some(8),
                None,
                is_active,
            ))
            .await?;
        Ok(room_id)
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn create_and_find_reservation(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = ReservationRepositoryImpl::new(ConnectionPool::new(pool.clone()));
        let room_id = fixture_room(&pool, true).await?;

        let id = repo
            .create(CreateReservation::new(
                room_id,
                "Alice".into(),
                period((10, 0), (11, 0)),
                Some("weekly sync".into()),
                true,
                Some(4),
                Some("two with milk".into()),
            ))
            .await?;

        let found = repo.find_by_id(id).await?.unwrap();
        assert_eq!(found.responsible, "Alice");
        assert_eq!(found.period, period((10, 0), (11, 0)));
        assert_eq!(found.coffee_quantity, Some(4));
        assert_eq!(found.room.id, room_id);
        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn duplicate_interval_is_rejected(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = ReservationRepositoryImpl::new(ConnectionPool::new(pool.clone()));
        let room_id = fixture_room(&pool, true).await?;

        repo.create(create_event(room_id, period((10, 0), (11, 0))))
            .await?;
        let err = repo
            .create(create_event(room_id, period((10, 0), (11, 0))))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ReservationConflict { .. }));
        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn touching_intervals_do_not_conflict(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = ReservationRepositoryImpl::new(ConnectionPool::new(pool.clone()));
        let room_id = fixture_room(&pool, true).await?;

        repo.create(create_event(room_id, period((10, 0), (11, 0))))
            .await?;
        // 11:00 終了と 11:00 開始は共存できる
        repo.create(create_event(room_id, period((11, 0), (12, 0))))
            .await?;
        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn containment_conflicts_in_both_directions(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = ReservationRepositoryImpl::new(ConnectionPool::new(pool.clone()));
        let room_id = fixture_room(&pool, true).await?;

        let id = repo
            .create(create_event(room_id, period((9, 0), (17, 0))))
            .await?;
        let err = repo
            .create(create_event(room_id, period((12, 0), (13, 0))))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ReservationConflict { .. }));

        repo.delete(DeleteReservation::new(id)).await?;
        repo.create(create_event(room_id, period((12, 0), (13, 0))))
            .await?;
        let err = repo
            .create(create_event(room_id, period((9, 0), (17, 0))))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ReservationConflict { .. }));
        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn different_rooms_do_not_conflict(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = ReservationRepositoryImpl::new(ConnectionPool::new(pool.clone()));
        let room_a = fixture_room(&pool, true).await?;
        let room_b = fixture_room(&pool, true).await?;

        repo.create(create_event(room_a, period((10, 0), (11, 0))))
            .await?;
        repo.create(create_event(room_b, period((10, 0), (11, 0))))
            .await?;
        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn inactive_room_rejects_reservations(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = ReservationRepositoryImpl::new(ConnectionPool::new(pool.clone()));
        let room_id = fixture_room(&pool, false).await?;

        let err = repo
            .create(create_event(room_id, period((10, 0), (11, 0))))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnprocessableEntity(_)));
        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn missing_room_is_not_found(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = ReservationRepositoryImpl::new(ConnectionPool::new(pool.clone()));
        let err = repo
            .create(create_event(RoomId::new(), period((10, 0), (11, 0))))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::EntityNotFound(_)));
        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn reschedule_excludes_own_reservation(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = ReservationRepositoryImpl::new(ConnectionPool::new(pool.clone()));
        let room_id = fixture_room(&pool, true).await?;

        let id = repo
            .create(create_event(room_id, period((10, 0), (12, 0))))
            .await?;

        // 自身の時間帯の内側へ動かしても、自分自身とは衝突しない
        repo.update(UpdateReservation::new(
            id,
            None,
            None,
            Some(at(10, 30)),
            Some(at(11, 30)),
            None,
            None,
            None,
            None,
        ))
        .await?;

        let found = repo.find_by_id(id).await?.unwrap();
        assert_eq!(found.period, period((10, 30), (11, 30)));
        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn reschedule_into_other_reservation_conflicts(
        pool: sqlx::PgPool,
    ) -> anyhow::Result<()> {
        let repo = ReservationRepositoryImpl::new(ConnectionPool::new(pool.clone()));
        let room_id = fixture_room(&pool, true).await?;

        repo.create(create_event(room_id, period((10, 0), (11, 0))))
            .await?;
        let id = repo
            .create(create_event(room_id, period((13, 0), (14, 0))))
            .await?;

        let err = repo
            .update(UpdateReservation::new(
                id,
                None,
                None,
                Some(at(10, 30)),
                Some(at(11, 30)),
                None,
                None,
                None,
                None,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::ReservationConflict { .. }));

        // 失敗した更新は何も変えない
        let found = repo.find_by_id(id).await?.unwrap();
        assert_eq!(found.period, period((13, 0), (14, 0)));
        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn description_only_update_keeps_schedule(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = ReservationRepositoryImpl::new(ConnectionPool::new(pool.clone()));
        let room_id = fixture_room(&pool, true).await?;

        let id = repo
            .create(create_event(room_id, period((10, 0), (11, 0))))
            .await?;
        repo.create(create_event(room_id, period((11, 0), (12, 0))))
            .await?;

        repo.update(UpdateReservation::new(
            id,
            None,
            None,
            None,
            None,
            Some("moved agenda".into()),
            None,
            None,
            None,
        ))
        .await?;

        let found = repo.find_by_id(id).await?.unwrap();
        assert_eq!(found.description.as_deref(), Some("moved agenda"));
        assert_eq!(found.period, period((10, 0), (11, 0)));
        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn inverted_period_update_is_rejected(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = ReservationRepositoryImpl::new(ConnectionPool::new(pool.clone()));
        let room_id = fixture_room(&pool, true).await?;

        let id = repo
            .create(create_event(room_id, period((10, 0), (11, 0))))
            .await?;
        // end だけを start より前へ動かすとマージ後の検証で弾かれる
        let err = repo
            .update(UpdateReservation::new(
                id,
                None,
                None,
                None,
                Some(at(9, 0)),
                None,
                None,
                None,
                None,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnprocessableEntity(_)));
        Ok(())
    }

    #[sqlx::test(migrations = "../migrations")]
    async fn concurrent_creates_commit_exactly_one(pool: sqlx::PgPool) -> anyhow::Result<()> {
        let repo = Arc::new(ReservationRepositoryImpl::new(ConnectionPool::new(
            pool.clone(),
        )));
        let room_id = fixture_room(&pool, true).await?;

        let a = tokio::spawn({
            let repo = repo.clone();
            async move { repo.create(create_event(room_id, period((10, 0), (11, 0)))).await }
        });
        let b = tokio::spawn({
            let repo = repo.clone();
            async move { repo.create(create_event(room_id, period((10, 0), (11, 0)))).await }
        });

        let (a, b) = (a.await?, b.await?);
        let succeeded = [&a, &b].iter().filter(|r| r.is_ok()).count();
        assert_eq!(succeeded, 1);

        let loser = if a.is_ok() { b } else { a };
        assert!(matches!(
            loser.unwrap_err(),
            AppError::ReservationConflict { .. }
        ));
        Ok(())
    }
}
