use crate::model::id::RoomId;

pub mod event;

#[derive(Debug)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub location: String,
    pub capacity: Option<i32>,
    pub description: Option<String>,
    pub is_active: bool,
}
