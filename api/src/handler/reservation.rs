use crate::{
    extractor::AuthorizedUser,
    model::reservation::{
        CreateReservationRequest, ReservationListQuery, ReservationResponse,
        ReservationsResponse, UpdateReservationRequest, UpdateReservationRequestWithId,
    },
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use garde::Validate;
use kernel::model::{
    id::ReservationId,
    reservation::event::{CreateReservation, DeleteReservation, UpdateReservation},
};
use registry::AppRegistry;
use shared::error::{AppError, AppResult};

pub async fn register_reservation(
    _user: AuthorizedUser,
    State(registry): State<AppRegistry>,
    Json(req): Json<CreateReservationRequest>,
) -> AppResult<impl IntoResponse> {
    req.validate(&())?;
    let event = CreateReservation::try_from(req)?;

    let reservation_id = registry.reservation_repository().create(event).await?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({ "reservationId": reservation_id })),
    ))
}

pub async fn show_reservation_list(
    _user: AuthorizedUser,
    Query(query): Query<ReservationListQuery>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<ReservationsResponse>> {
    registry
        .reservation_repository()
        .find_all(query.into())
        .await
        .map(ReservationsResponse::from)
        .map(Json)
}

pub async fn show_reservation(
    _user: AuthorizedUser,
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
) -> AppResult<Json<ReservationResponse>> {
    registry
        .reservation_repository()
        .find_by_id(reservation_id)
        .await
        .and_then(|reservation| match reservation {
            Some(r) => Ok(Json(r.into())),
            None => Err(AppError::EntityNotFound(format!(
                "reservation ({reservation_id}) was not found"
            ))),
        })
}

pub async fn update_reservation(
    _user: AuthorizedUser,
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
    Json(req): Json<UpdateReservationRequest>,
) -> AppResult<StatusCode> {
    req.validate(&())?;
    let event = UpdateReservation::try_from(UpdateReservationRequestWithId::new(
        reservation_id,
        req,
    ))?;

    registry
        .reservation_repository()
        .update(event)
        .await
        .map(|_| StatusCode::OK)
}

pub async fn delete_reservation(
    _user: AuthorizedUser,
    Path(reservation_id): Path<ReservationId>,
    State(registry): State<AppRegistry>,
) -> AppResult<StatusCode> {
    registry
        .reservation_repository()
        .delete(DeleteReservation::new(reservation_id))
        .await
        .map(|_| StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use kernel::model::{auth::AccessToken, id::RoomId, user::User};
    use kernel::repository::reservation::MockReservationRepository;
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

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 2, hour, 0, 0).unwrap()
    }

    fn registry_with(repo: MockReservationRepository) -> AppRegistry {
        let mut registry = MockAppRegistryExt::new();
        let repo = Arc::new(repo);
        registry
            .expect_reservation_repository()
            .returning(move || repo.clone());
        Arc::new(registry)
    }

    fn create_request(start: DateTime<Utc>, end: DateTime<Utc>) -> CreateReservationRequest {
        CreateReservationRequest {
            room_id: RoomId::new(),
            responsible: "Alice".into(),
            start,
            end,
            description: None,
            coffee_requested: false,
            coffee_quantity: None,
            coffee_note: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_inverted_period_before_store() {
        // 期待値未設定の registry なので、リポジトリが呼ばれたらテストは落ちる
        let registry: AppRegistry = Arc::new(MockAppRegistryExt::new());

        let err = register_reservation(
            authorized_user(),
            State(registry),
            Json(create_request(at(11), at(10))),
        )
        .await
        .err()
        .unwrap();

        assert!(matches!(err, AppError::UnprocessableEntity(_)));
    }

    #[tokio::test]
    async fn create_rejects_orphan_coffee_quantity() {
        let registry: AppRegistry = Arc::new(MockAppRegistryExt::new());

        let mut req = create_request(at(10), at(11));
        req.coffee_quantity = Some(3);

        let err = register_reservation(authorized_user(), State(registry), Json(req))
            .await
            .err()
            .unwrap();

        assert!(matches!(err, AppError::UnprocessableEntity(_)));
    }

    #[tokio::test]
    async fn create_surfaces_conflict_from_store() {
        let mut repo = MockReservationRepository::new();
        repo.expect_create().returning(|event| {
            Err(AppError::ReservationConflict {
                start: event.period.start(),
                end: event.period.end(),
            })
        });

        let err = register_reservation(
            authorized_user(),
            State(registry_with(repo)),
            Json(create_request(at(10), at(11))),
        )
        .await
        .err()
        .unwrap();

        assert!(matches!(err, AppError::ReservationConflict { .. }));
    }

    #[tokio::test]
    async fn description_only_update_does_not_touch_schedule() {
        let mut repo = MockReservationRepository::new();
        repo.expect_update()
            .withf(|event| !event.touches_schedule())
            .returning(|_| Ok(()));

        let req = UpdateReservationRequest {
            room_id: None,
            responsible: None,
            start: None,
            end: None,
            description: Some("moved agenda".into()),
            coffee_requested: None,
            coffee_quantity: None,
            coffee_note: None,
        };
        let status = update_reservation(
            authorized_user(),
            Path(ReservationId::new()),
            State(registry_with(repo)),
            Json(req),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn update_rejects_inverted_period_before_store() {
        let registry: AppRegistry = Arc::new(MockAppRegistryExt::new());

        let req = UpdateReservationRequest {
            room_id: None,
            responsible: None,
            start: Some(at(11)),
            end: Some(at(10)),
            description: None,
            coffee_requested: None,
            coffee_quantity: None,
            coffee_note: None,
        };
        let err = update_reservation(
            authorized_user(),
            Path(ReservationId::new()),
            State(registry),
            Json(req),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::UnprocessableEntity(_)));
    }
}
