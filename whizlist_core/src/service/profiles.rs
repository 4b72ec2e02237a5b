use sea_orm::DatabaseConnection;
use thiserror::Error;
use tracing::debug;
use zel_core::prelude::*;

use crate::{entity::prelude::*, ids::UserId};

#[derive(Debug, Error)]
pub enum ProfilesServiceError {
    #[error("fatal database error")]
    DbError(#[from] DbErr),

    #[error("profile not found")]
    ProfileNotFound,

    #[error("profile name must not be empty")]
    EmptyName,
}

impl From<ProfilesServiceError> for ResourceError {
    fn from(error: ProfilesServiceError) -> Self {
        match error {
            ProfilesServiceError::DbError(error) => ResourceError::infra(error),
            ProfilesServiceError::ProfileNotFound => ResourceError::app(error),
            ProfilesServiceError::EmptyName => ResourceError::app(error),
        }
    }
}

#[derive(Clone)]
pub struct ProfilesService {
    db: DatabaseConnection,
}

impl ProfilesService {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    pub async fn _create_profile(
        &self,
        name: String,
        avatar_url: Option<String>,
    ) -> Result<ProfileModel, ProfilesServiceError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(ProfilesServiceError::EmptyName);
        }

        let profile = ProfileActiveModel {
            id: Set(UserId::new()),
            name: Set(name),
            avatar_url: Set(avatar_url),
            created_at: Set(chrono::Utc::now()),
        };

        let profile = Profile::insert(profile)
            .exec_with_returning(&self.db)
            .await?;
        debug!(profile_id = %profile.id, "created profile");

        Ok(profile)
    }

    pub async fn _get_profile(&self, id: UserId) -> Result<ProfileModel, ProfilesServiceError> {
        Profile::find_by_id(id)
            .one(&self.db)
            .await?
            .ok_or(ProfilesServiceError::ProfileNotFound)
    }

    pub async fn _list_profiles(&self) -> Result<Vec<ProfileModel>, ProfilesServiceError> {
        let profiles = Profile::find()
            .order_by_asc(ProfileColumn::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(profiles)
    }
}

#[zel_service(name = "profile")]
trait Profiles {
    #[method(name = "create_profile")]
    async fn create_profile(
        &self,
        name: String,
        avatar_url: Option<String>,
    ) -> Result<ProfileModel, ResourceError>;

    #[method(name = "get_profile")]
    async fn get_profile(&self, id: UserId) -> Result<ProfileModel, ResourceError>;

    #[method(name = "list_profiles")]
    async fn list_profiles(&self) -> Result<Vec<ProfileModel>, ResourceError>;
}

#[async_trait]
impl ProfilesServer for ProfilesService {
    async fn create_profile(
        &self,
        _ctx: RequestContext,
        name: String,
        avatar_url: Option<String>,
    ) -> Result<ProfileModel, ResourceError> {
        Ok(self._create_profile(name, avatar_url).await?)
    }

    async fn get_profile(
        &self,
        _ctx: RequestContext,
        id: UserId,
    ) -> Result<ProfileModel, ResourceError> {
        Ok(self._get_profile(id).await?)
    }

    async fn list_profiles(&self, _ctx: RequestContext) -> Result<Vec<ProfileModel>, ResourceError> {
        Ok(self._list_profiles().await?)
    }
}
