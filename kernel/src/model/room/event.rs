use crate::model::id::RoomId;
use derive_new::new;

#[derive(Debug, new)]
pub struct CreateRoom {
    pub name: String,
    pub location: String,
    pub capacity: Option<i32>,
    pub description: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, new)]
pub struct UpdateRoom {
    pub room_id: RoomId,
    pub name: Option<String>,
    pub location: Option<String>,
    pub capacity: Option<i32>,
    pub description: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, new)]
pub struct DeleteRoom {
    pub room_id: RoomId,
}
