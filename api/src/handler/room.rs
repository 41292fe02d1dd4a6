use crate::{
    extractor::AuthorizedUser,
    model::room::{
        CreateRoomRequest, RoomAvailabilityQuery, RoomAvailabilityResponse, RoomResponse,
        RoomsResponse, UpdateRoomRequest, UpdateRoomRequestWithId,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use garde::Validate;
use kernel::model::{
    id::RoomId,
    reservation::Period,
    room::event::DeleteRoom,
};
use registry::AppRegistry;
use shared::error::{AppError, AppResult};

pub async fn register_room(
    _user: AuthorizedUser,
    State(registry): State<AppRegistry>,
    Json(req): Json<CreateRoomRequest>,
) -> AppResult<StatusCode> {
    req.validate(&())?;

    registry
        .room_repository()
        .create(req.into())
        .await
        .map(|_| StatusCode::CREATED)
}

pub async fn show_room_list(
    _user: AuthorizedUser,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<RoomsResponse>> {
    registry
        .room_repository()
        .find_all()
        .await
        .map(RoomsResponse::from)
        .map(Json)
}

pub async fn show_room(
    _user: AuthorizedUser,
    Path(room_id): Path<RoomId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<RoomResponse>> {
    registry
        .room_repository()
        .find_by_id(room_id)
        .await
        .and_then(|room| match room {
            Some(room) => Ok(Json(room.into())),
            None => Err(AppError::EntityNotFound(format!(
                "room ({room_id}) was not found"
            ))),
        })
}

pub async fn update_room(
    _user: AuthorizedUser,
    Path(room_id): Path<RoomId>,
    State(registry): State<AppRegistry>,
    Json(req): Json<UpdateRoomRequest>,
) -> AppResult<StatusCode> {
    req.validate(&())?;

    let update_room = UpdateRoomRequestWithId::new(room_id, req);
    registry
        .room_repository()
        .update(update_room.into())
        .await
        .map(|_| StatusCode::OK)
}

pub async fn delete_room(
    _user: AuthorizedUser,
    Path(room_id): Path<RoomId>,
    State(registry): State<AppRegistry>,
) -> AppResult<StatusCode> {
    registry
        .room_repository()
        .delete(DeleteRoom::new(room_id))
        .await
        .map(|_| StatusCode::NO_CONTENT)
}

// 指定の時間帯に部屋が空いているかどうかを返す。
// 空き = その部屋の既存予約のどれとも重ならないこと。
pub async fn check_room_availability(
    _user: AuthorizedUser,
    Path(room_id): Path<RoomId>,
    Query(query): Query<RoomAvailabilityQuery>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<RoomAvailabilityResponse>> {
    if registry
        .room_repository()
        .find_by_id(room_id)
        .await?
        .is_none()
    {
        return Err(AppError::EntityNotFound(format!(
            "room ({room_id}) was not found"
        )));
    }

    let period = Period::new(query.start, query.end)?;
    let conflict = registry
        .reservation_repository()
        .has_conflict(room_id, period, None)
        .await?;

    Ok(Json(RoomAvailabilityResponse {
        room_id,
        start: period.start(),
        end: period.end(),
        available: !conflict,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use kernel::model::{auth::AccessToken, room::Room, user::User};
    use kernel::repository::{
        reservation::MockReservationRepository, room::MockRoomRepository,
    };
    use registry::MockAppRegistryExt;
    use std::sync::Arc;

    fn authorized_user() -> AuthorizedUser {
        AuthorizedUser {
            access_token: AccessToken("dummy".into()),
            user: User {
                id: kernel::model::id::UserId::new(),
                name: "Alice".into(),
                email: "alice@example.com".into(),
                is_active: true,
            },
        }
    }

    fn fixture_room(room_id: RoomId) -> Room {
        Room {
            id: room_id,
            name: "Fuji".into(),
            location: "HQ 2F".into(),
            capacity: Some(8),
            description: None,
            is_active: true,
        }
    }

    fn registry_with(
        room_repo: MockRoomRepository,
        reservation_repo: MockReservationRepository,
    ) -> AppRegistry {
        let mut registry = MockAppRegistryExt::new();
        let room_repo = Arc::new(room_repo);
        let reservation_repo = Arc::new(reservation_repo);
        registry
            .expect_room_repository()
            .returning(move || room_repo.clone());
        registry
            .expect_reservation_repository()
            .returning(move || reservation_repo.clone());
        Arc::new(registry)
    }

    #[tokio::test]
    async fn availability_is_negation_of_conflict() {
        let room_id = RoomId::new();

        let mut room_repo = MockRoomRepository::new();
        room_repo
            .expect_find_by_id()
            .returning(move |id| Ok(Some(fixture_room(id))));
        let mut reservation_repo = MockReservationRepository::new();
        reservation_repo
            .expect_has_conflict()
            .returning(|_, _, _| Ok(true));

        let query = RoomAvailabilityQuery {
            start: Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap(),
        };
        let Json(res) = check_room_availability(
            authorized_user(),
            Path(room_id),
            Query(query),
            State(registry_with(room_repo, reservation_repo)),
        )
        .await
        .unwrap();

        assert!(!res.available);
        assert_eq!(res.room_id, room_id);
    }

    #[tokio::test]
    async fn availability_rejects_unknown_room() {
        let mut room_repo = MockRoomRepository::new();
        room_repo.expect_find_by_id().returning(|_| Ok(None));

        let query = RoomAvailabilityQuery {
            start: Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap(),
        };
        let err = check_room_availability(
            authorized_user(),
            Path(RoomId::new()),
            Query(query),
            State(registry_with(room_repo, MockReservationRepository::new())),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::EntityNotFound(_)));
    }

    #[tokio::test]
    async fn availability_rejects_inverted_period() {
        let mut room_repo = MockRoomRepository::new();
        room_repo
            .expect_find_by_id()
            .returning(move |id| Ok(Some(fixture_room(id))));

        // 期間が逆転している場合、予約リポジトリには触れずに弾く
        let query = RoomAvailabilityQuery {
            start: Utc.with_ymd_and_hms(2025, 6, 2, 11, 0, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2025, 6, 2, 10, 0, 0).unwrap(),
        };
        let err = check_room_availability(
            authorized_user(),
            Path(RoomId::new()),
            Query(query),
            State(registry_with(room_repo, MockReservationRepository::new())),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::UnprocessableEntity(_)));
    }
}
