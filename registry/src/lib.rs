use std::sync::Arc;

use adapter::database::ConnectionPool;
use adapter::redis::RedisClient;
use adapter::repository::{
    auth::AuthRepositoryImpl, health::HealthCheckRepositoryImpl,
    reservation::ReservationRepositoryImpl, room::RoomRepositoryImpl, user::UserRepositoryImpl,
};
use kernel::repository::{
    auth::AuthRepository, health::HealthCheckRepository, reservation::ReservationRepository,
    room::RoomRepository, user::UserRepository,
};
use shared::config::AppConfig;

pub struct AppRegistryImpl {
    health_check_repository: Arc<dyn HealthCheckRepository>,
    room_repository: Arc<dyn RoomRepository>,
    reservation_repository: Arc<dyn ReservationRepository>,
    user_repository: Arc<dyn UserRepository>,
    auth_repository: Arc<dyn AuthRepository>,
}

impl AppRegistryImpl {
    pub fn new(pool: ConnectionPool, redis_client: Arc<RedisClient>, app_config: AppConfig) -> Self {
        let health_check_repository = Arc::new(HealthCheckRepositoryImpl::new(pool.clone()));
        let room_repository = Arc::new(RoomRepositoryImpl::new(pool.clone()));
        let reservation_repository = Arc::new(ReservationRepositoryImpl::new(pool.clone()));
        let user_repository = Arc::new(UserRepositoryImpl::new(pool.clone()));
        let auth_repository = Arc::new(AuthRepositoryImpl::new(
            pool.clone(),
            redis_client.clone(),
            app_config.auth.ttl,
        ));
        Self {
            health_check_repository,
            room_repository,
            reservation_repository,
            user_repository,
            auth_repository,
        }
    }
}

#[cfg_attr(feature = "mock", mockall::automock)]
pub trait AppRegistryExt: Send + Sync {
    fn health_check_repository(&self) -> Arc<dyn HealthCheckRepository>;
    fn room_repository(&self) -> Arc<dyn RoomRepository>;
    fn reservation_repository(&self) -> Arc<dyn ReservationRepository>;
    fn user_repository(&self) -> Arc<dyn UserRepository>;
    fn auth_repository(&self) -> Arc<dyn AuthRepository>;
}

impl AppRegistryExt for AppRegistryImpl {
    fn health_check_repository(&self) -> Arc<dyn HealthCheckRepository> {
        self.health_check_repository.clone()
    }

    fn room_repository(&self) -> Arc<dyn RoomRepository> {
        self.room_repository.clone()
    }

    fn reservation_repository(&self) -> Arc<dyn ReservationRepository> {
        self.reservation_repository.clone()
    }

    fn user_repository(&self) -> Arc<dyn UserRepository> {
        self.user_repository.clone()
    }

    fn auth_repository(&self) -> Arc<dyn AuthRepository> {
        self.auth_repository.clone()
    }
}

pub type AppRegistry = Arc<dyn AppRegistryExt>;
