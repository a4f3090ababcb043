use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use herqles_api::{create_routes, AppState, BusTokenValidator, LocalTokenValidator, TokenValidator};
use herqles_auth::{AuthBackends, AuthorizationService, UserService};
use herqles_core::{
    config::{AppConfig, TokenValidationMode},
    traits::MessageBus,
    ServiceContext,
};
use herqles_dispatcher::{control_plane_handlers, SubscriberSet};
use herqles_infrastructure::{
    sqlite_context, DatabaseManager, LdapDirectory, MessageBusFactory, RpcClient,
};
use tokio::{
    net::TcpListener,
    sync::{broadcast, oneshot},
};
use tracing::{error, info, warn};

/// Manager进程
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    ctx: ServiceContext,
    backends: AuthBackends,
}

impl Application {
    /// 连接存储与消息总线并加载认证后端
    pub async fn new(config: AppConfig) -> Result<Self> {
        info!("初始化Herqles manager");

        let database = DatabaseManager::connect(&config.database)
            .await
            .context("连接数据库失败")?;

        let bus = MessageBusFactory::create(&config.message_queue)
            .await
            .context("创建消息总线失败")?;

        let mut ctx = sqlite_context(&database, bus, config.message_queue.rpc_timeout());
        if let Some(ldap) = &config.ldap {
            info!("启用LDAP目录服务: {}", ldap.url);
            ctx = ctx.with_directory(Arc::new(LdapDirectory::new(ldap.clone())));
        }

        let backends = AuthBackends::load(&ctx, &config.identity, &config.assignment)
            .await
            .context("加载认证后端失败")?;

        Ok(Self {
            config,
            database,
            ctx,
            backends,
        })
    }

    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    pub fn auth(&self) -> &AuthBackends {
        &self.backends
    }

    /// 按 `api.token_validation` 选择令牌校验方式构建路由
    pub fn router(&self) -> Router {
        let users = UserService::new(&self.backends);
        let validator: Arc<dyn TokenValidator> = match self.config.api.token_validation {
            TokenValidationMode::Bus => Arc::new(BusTokenValidator::new(RpcClient::new(
                self.ctx.bus.clone(),
                self.ctx.rpc_timeout,
            ))),
            TokenValidationMode::Local => {
                Arc::new(LocalTokenValidator::new(users.authorization().clone()))
            }
        };
        create_routes(AppState::new(self.ctx.clone(), users, validator))
    }

    /// 绑定配置中的API地址后运行，直到收到关闭信号
    pub async fn run(self, shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let listener = if self.config.api.enabled {
            let listener = TcpListener::bind(&self.config.api.bind_address)
                .await
                .with_context(|| format!("绑定地址失败: {}", self.config.api.bind_address))?;
            Some(listener)
        } else {
            None
        };

        self.serve(listener, shutdown_rx).await
    }

    /// 启动队列订阅和可选的HTTP服务，关闭时依次停止订阅、HTTP、消息总线和连接池
    pub async fn serve(
        self,
        listener: Option<TcpListener>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut subscribers = SubscriberSet::new(self.ctx.bus.clone());
        subscribers
            .start_all(control_plane_handlers(
                &self.ctx,
                AuthorizationService::new(self.backends.assignment.clone()),
            ))
            .await
            .context("启动队列订阅失败")?;
        info!("已启动 {} 个队列订阅", subscribers.len());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let server = match listener {
            Some(listener) => {
                let router = self.router();
                if let Ok(addr) = listener.local_addr() {
                    info!("API服务器启动在 http://{}", addr);
                }

                Some(tokio::spawn(async move {
                    let result = axum::serve(listener, router)
                        .with_graceful_shutdown(async move {
                            let _ = stop_rx.await;
                        })
                        .await;
                    if let Err(e) = result {
                        error!("API服务器运行失败: {}", e);
                    }
                }))
            }
            None => {
                info!("API服务器未启用");
                None
            }
        };

        let _ = shutdown_rx.recv().await;
        info!("收到关闭信号，停止队列订阅");
        subscribers.stop_all().await;

        if let Some(server) = server {
            let _ = stop_tx.send(());
            if let Err(e) = server.await {
                error!("等待API服务器退出失败: {}", e);
            }
            info!("API服务器已停止");
        }

        if let Err(e) = self.ctx.bus.close().await {
            warn!("关闭消息总线失败: {}", e);
        }
        self.database.close().await;

        info!("Herqles manager已停止");
        Ok(())
    }
}
