//! 按名称选择身份与授权后端
//!
//! 驱动表在编译期固定，启动时按配置名称查找，未知名称视为配置错误。

use std::sync::Arc;

use futures::future::BoxFuture;
use herqles_core::{
    config::{AssignmentConfig, IdentityConfig},
    traits::DirectoryService,
    HerqlesError, HerqlesResult, ServiceContext,
};
use tracing::info;

use crate::assignment::{AssignmentBackend, DirectoryAssignmentBackend, SqlAssignmentBackend};
use crate::identity::{DirectoryIdentityBackend, IdentityBackend, SqlIdentityBackend};
use crate::token::TokenManager;

pub type IdentityConstructor = fn(&ServiceContext) -> HerqlesResult<Arc<dyn IdentityBackend>>;

pub type AssignmentConstructor = for<'a> fn(
    &'a ServiceContext,
    &'a AssignmentConfig,
) -> BoxFuture<'a, HerqlesResult<Arc<dyn AssignmentBackend>>>;

pub const IDENTITY_DRIVERS: &[(&str, IdentityConstructor)] =
    &[("sql", sql_identity), ("ldap", directory_identity)];

pub const ASSIGNMENT_DRIVERS: &[(&str, AssignmentConstructor)] =
    &[("sql", sql_assignment), ("ldap", directory_assignment)];

/// 启动时选定的一对后端
#[derive(Clone)]
pub struct AuthBackends {
    pub identity: Arc<dyn IdentityBackend>,
    pub assignment: Arc<dyn AssignmentBackend>,
}

impl AuthBackends {
    pub async fn load(
        ctx: &ServiceContext,
        identity: &IdentityConfig,
        assignment: &AssignmentConfig,
    ) -> HerqlesResult<Self> {
        let identity_backend = identity_backend(&identity.driver, ctx)?;
        let assignment_backend = assignment_backend(&assignment.driver, ctx, assignment).await?;

        info!(
            "认证后端已加载: identity={}, assignment={}",
            identity_backend.name(),
            assignment_backend.name()
        );

        Ok(Self {
            identity: identity_backend,
            assignment: assignment_backend,
        })
    }
}

pub fn identity_backend(
    name: &str,
    ctx: &ServiceContext,
) -> HerqlesResult<Arc<dyn IdentityBackend>> {
    let (_, constructor) = IDENTITY_DRIVERS
        .iter()
        .find(|(driver, _)| *driver == name)
        .ok_or_else(|| HerqlesError::configuration(format!("未知的身份驱动: {name}")))?;
    constructor(ctx)
}

pub async fn assignment_backend(
    name: &str,
    ctx: &ServiceContext,
    config: &AssignmentConfig,
) -> HerqlesResult<Arc<dyn AssignmentBackend>> {
    let (_, constructor) = ASSIGNMENT_DRIVERS
        .iter()
        .find(|(driver, _)| *driver == name)
        .ok_or_else(|| HerqlesError::configuration(format!("未知的授权驱动: {name}")))?;
    constructor(ctx, config).await
}

fn require_directory(ctx: &ServiceContext) -> HerqlesResult<Arc<dyn DirectoryService>> {
    ctx.directory
        .clone()
        .ok_or_else(|| HerqlesError::configuration("ldap驱动需要配置[ldap]目录服务"))
}

fn sql_identity(ctx: &ServiceContext) -> HerqlesResult<Arc<dyn IdentityBackend>> {
    Ok(Arc::new(SqlIdentityBackend::new(ctx.identities.clone())))
}

fn directory_identity(ctx: &ServiceContext) -> HerqlesResult<Arc<dyn IdentityBackend>> {
    Ok(Arc::new(DirectoryIdentityBackend::new(require_directory(ctx)?)))
}

fn sql_assignment<'a>(
    ctx: &'a ServiceContext,
    config: &'a AssignmentConfig,
) -> BoxFuture<'a, HerqlesResult<Arc<dyn AssignmentBackend>>> {
    Box::pin(async move {
        let admin = config
            .admin_username
            .clone()
            .filter(|admin| !admin.is_empty())
            .ok_or_else(|| HerqlesError::configuration("sql授权驱动必须配置admin_username"))?;

        let backend = SqlAssignmentBackend::new(
            ctx.assignments.clone(),
            TokenManager::new(ctx.assignments.clone(), config.token_window()),
            admin,
        );
        backend.bootstrap().await?;
        Ok(Arc::new(backend) as Arc<dyn AssignmentBackend>)
    })
}

fn directory_assignment<'a>(
    ctx: &'a ServiceContext,
    config: &'a AssignmentConfig,
) -> BoxFuture<'a, HerqlesResult<Arc<dyn AssignmentBackend>>> {
    Box::pin(async move {
        let backend = DirectoryAssignmentBackend::new(
            ctx.assignments.clone(),
            require_directory(ctx)?,
            TokenManager::new(ctx.assignments.clone(), config.token_window()),
            config.mapping.clone(),
            config.admin_username.clone().filter(|admin| !admin.is_empty()),
        );
        Ok(Arc::new(backend) as Arc<dyn AssignmentBackend>)
    })
}
