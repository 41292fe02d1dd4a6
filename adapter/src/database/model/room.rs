use kernel::model::{id::RoomId, room::Room};

#[derive(sqlx::FromRow)]
pub struct RoomRow {
    pub room_id: RoomId,
    pub name: String,
    pub location: String,
    pub capacity: Option<i32>,
    pub description: Option<String>,
    pub is_active: bool,
}

impl From<RoomRow> for Room {
    fn from(value: RoomRow) -> Self {
        let RoomRow {
            room_id,
            name,
            location,
            capacity,
            description,
            is_active,
        } = value;
        Room {
            id: room_id,
            name,
            location,
            capacity,
            description,
            is_active,
        }
    }
}
