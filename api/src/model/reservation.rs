use chrono::{DateTime, Utc};
use derive_new::new;
use garde::Validate;
use kernel::model::{
    id::{ReservationId, RoomId},
    reservation::{
        event::{CreateReservation, ReservationListOptions, UpdateReservation},
        Period, Reservation, ReservationRoom,
    },
};
use serde::{Deserialize, Serialize};
use shared::error::AppError;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateReservationRequest {
    #[garde(skip)]
    pub room_id: RoomId,
    #[garde(length(min = 1, max = 200))]
    pub responsible: String,
    #[garde(skip)]
    pub start: DateTime<Utc>,
    #[garde(skip)]
    pub end: DateTime<Utc>,
    #[garde(skip)]
    pub description: Option<String>,
    #[garde(skip)]
    #[serde(default)]
    pub coffee_requested: bool,
    #[garde(inner(range(min = 1)))]
    pub coffee_quantity: Option<i32>,
    #[garde(skip)]
    pub coffee_note: Option<String>,
}

impl TryFrom<CreateReservationRequest> for CreateReservation {
    type Error = AppError;

    fn try_from(value: CreateReservationRequest) -> Result<Self, Self::Error> {
        // end > start の検証はここで落とし、ストアには触れない
        let period = Period::new(value.start, value.end)?;
        if value.coffee_quantity.is_some() && !value.coffee_requested {
            return Err(AppError::UnprocessableEntity(
                "coffee quantity was given but coffee is not requested".into(),
            ));
        }
        Ok(CreateReservation {
            room_id: value.room_id,
            responsible: value.responsible,
            period,
            description: value.description,
            coffee_requested: value.coffee_requested,
            coffee_quantity: value.coffee_quantity,
            coffee_note: value.coffee_note,
        })
    }
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReservationRequest {
    #[garde(skip)]
    pub room_id: Option<RoomId>,
    #[garde(inner(length(min = 1, max = 200)))]
    pub responsible: Option<String>,
    #[garde(skip)]
    pub start: Option<DateTime<Utc>>,
    #[garde(skip)]
    pub end: Option<DateTime<Utc>>,
    #[garde(skip)]
    pub description: Option<String>,
    #[garde(skip)]
    pub coffee_requested: Option<bool>,
    #[garde(inner(range(min = 1)))]
    pub coffee_quantity: Option<i32>,
    #[garde(skip)]
    pub coffee_note: Option<String>,
}

#[derive(new)]
pub struct UpdateReservationRequestWithId(ReservationId, UpdateReservationRequest);

impl TryFrom<UpdateReservationRequestWithId> for UpdateReservation {
    type Error = AppError;

    fn try_from(value: UpdateReservationRequestWithId) -> Result<Self, Self::Error> {
        let UpdateReservationRequestWithId(reservation_id, req) = value;
        // 両端とも指定されている場合は、マージを待たずにこの場で検証できる
        if let (Some(start), Some(end)) = (req.start, req.end) {
            Period::new(start, end)?;
        }
        if req.coffee_quantity.is_some() && req.coffee_requested == Some(false) {
            return Err(AppError::UnprocessableEntity(
                "coffee quantity was given but coffee is not requested".into(),
            ));
        }
        Ok(UpdateReservation {
            reservation_id,
            room_id: req.room_id,
            responsible: req.responsible,
            start: req.start,
            end: req.end,
            description: req.description,
            coffee_requested: req.coffee_requested,
            coffee_quantity: req.coffee_quantity,
            coffee_note: req.coffee_note,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationListQuery {
    pub room_id: Option<RoomId>,
    pub responsible: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl From<ReservationListQuery> for ReservationListOptions {
    fn from(value: ReservationListQuery) -> Self {
        let ReservationListQuery {
            room_id,
            responsible,
            from,
            until,
        } = value;
        ReservationListOptions {
            room_id,
            responsible,
            from,
            until,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationResponse {
    pub id: ReservationId,
    pub responsible: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub description: Option<String>,
    pub coffee_requested: bool,
    pub coffee_quantity: Option<i32>,
    pub coffee_note: Option<String>,
    pub room: ReservationRoomResponse,
}

impl From<Reservation> for ReservationResponse {
    fn from(value: Reservation) -> Self {
        let Reservation {
            id,
            responsible,
            period,
            description,
            coffee_requested,
            coffee_quantity,
            coffee_note,
            room,
        } = value;
        Self {
            id,
            responsible,
            start: period.start(),
            end: period.end(),
            description,
            coffee_requested,
            coffee_quantity,
            coffee_note,
            room: room.into(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRoomResponse {
    pub id: RoomId,
    pub name: String,
    pub location: String,
    pub is_active: bool,
}

impl From<ReservationRoom> for ReservationRoomResponse {
    fn from(value: ReservationRoom) -> Self {
        let ReservationRoom {
            id,
            name,
            location,
            is_active,
        } = value;
        Self {
            id,
            name,
            location,
            is_active,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationsResponse {
    pub items: Vec<ReservationResponse>,
}

impl From<Vec<Reservation>> for ReservationsResponse {
    fn from(value: Vec<Reservation>) -> Self {
        Self {
            items: value.into_iter().map(ReservationResponse::from).collect(),
        }
    }
}
