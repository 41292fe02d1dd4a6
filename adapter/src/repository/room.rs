use crate::database::{model::room::RoomRow, ConnectionPool};
use async_trait::async_trait;
use derive_new::new;
use kernel::model::{
    id::RoomId,
    room::{
        event::{CreateRoom, DeleteRoom, UpdateRoom},
        Room,
    },
};
use kernel::repository::room::RoomRepository;
use shared::error::{AppError, AppResult};

// unique_violation (SQLSTATE)
const UNIQUE_VIOLATION: &str = "23505";

#[derive(new)]
pub struct RoomRepositoryImpl {
    db: ConnectionPool,
}

#[async_trait]
impl RoomRepository for RoomRepositoryImpl {
    async fn create(&self, event: CreateRoom) -> AppResult<RoomId> {
        let room_id = RoomId::new();
        sqlx::query(
            r#"
                INSERT INTO rooms (room_id, name, location, capacity, description, is_active)
                VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(room_id)
        .bind(event.name)
        .bind(event.location)
        .bind(event.capacity)
        .bind(event.description)
        .bind(event.is_active)
        .execute(self.db.inner_ref())
        .await
        .map_err(map_unique_name_violation)?;

        Ok(room_id)
    }

    async fn find_all(&self) -> AppResult<Vec<Room>> {
        let rows: Vec<RoomRow> = sqlx::query_as(
            r#"
                SELECT room_id, name, location, capacity, description, is_active
                FROM rooms
                ORDER BY created_at DESC
            "#,
        )
        .fetch_all(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(rows.into_iter().map(Room::from).collect())
    }

    async fn find_by_id(&self, room_id: RoomId) -> AppResult<Option<Room>> {
        let row: Option<RoomRow> = sqlx::query_as(
            r#"
                SELECT room_id, name, location, capacity, description, is_active
                FROM rooms
                WHERE room_id = $1
            "#,
        )
        .bind(room_id)
        .fetch_optional(self.db.inner_ref())
        .await
        .map_err(AppError::SpecificOperationError)?;

        Ok(row.map(Room::from))
    }

    async fn update(&self, event: UpdateRoom) -> AppResult<()> {
        // Some のフィールドだけを書き換える
        let res = sqlx::query(
            r#"
                UPDATE rooms
                SET name = COALESCE($2, name),
                    location = COALESCE($3, location),
                    capacity = COALESCE($4, capacity),
                    description = COALESCE($5, description),
                    is_active = COALESCE($6, is_active),
                    updated_at = CURRENT_TIMESTAMP
                WHERE room_id = $1
            "#,
        )
        .bind(event.room_id)
        .bind(event.name)
        .bind(event.location)
        .bind(event.capacity)
        .bind(event.description)
        .bind(event.is_active)
        .execute(self.db.inner_ref())
        .await
        .map_err(map_unique_name_violation)?;

        if res.rows_affected() < 1 {
            return Err(AppError::EntityNotFound(format!(
                "room ({}) was not found",
                event.room_id
            )));
        }

        Ok(())
    }

    // 部屋の削除。reservations は外部キーの ON DELETE CASCADE で一緒に消える。
    async fn delete(&self, event: DeleteRoom) -> AppResult<()> {
        let res = sqlx::query("DELETE FROM rooms WHERE room_id = $1")
            .bind(event.room_id)
            .execute(self.db.inner_ref())
            .await
            .map_err(AppError::SpecificOperationError)?;

        if res.rows_affected() < 1 {
            return Err(AppError::EntityNotFound(format!(
                "room ({}) was not found",
                event.room_id
            )));
        }

        Ok(())
    }
}

fn map_unique_name_violation(e: sqlx::Error) -> AppError {
    match e.as_database_error().and_then(|db_err| db_err.code()) {
        Some(code) if code == UNIQUE_VIOLATION => {
            AppError::UnprocessableEntity("a room with this name already exists".into())
        }
        _ => AppError::SpecificOperationError(e),
    }
}
