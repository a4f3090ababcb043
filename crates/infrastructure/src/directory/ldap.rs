use async_trait::async_trait;
use herqles_core::{
    config::LdapConfig,
    traits::{DirectoryEntry, DirectoryService},
    HerqlesError, HerqlesResult,
};
use ldap3::{ldap_escape, Ldap, LdapConnAsync, Scope, SearchEntry};
use tracing::{debug, warn};

/// 简单绑定失败时LDAP返回的结果码
const INVALID_CREDENTIALS: u32 = 49;

/// LDAP/Active Directory 目录服务
///
/// 每次调用建立独立连接，用完即解绑。
pub struct LdapDirectory {
    config: LdapConfig,
}

impl LdapDirectory {
    pub fn new(config: LdapConfig) -> Self {
        Self { config }
    }

    async fn open(&self) -> HerqlesResult<Ldap> {
        let (conn, ldap) = LdapConnAsync::new(&self.config.url)
            .await
            .map_err(|e| HerqlesError::directory(format!("连接LDAP失败: {e}")))?;
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP连接错误: {}", e);
            }
        });
        Ok(ldap)
    }

    async fn service_bind(&self) -> HerqlesResult<Ldap> {
        let mut ldap = self.open().await?;
        ldap.simple_bind(
            &self.config.principal(&self.config.bind_username),
            &self.config.bind_password,
        )
        .await
        .and_then(|result| result.success())
        .map_err(|e| HerqlesError::directory(format!("LDAP服务账号绑定失败: {e}")))?;
        Ok(ldap)
    }
}

#[async_trait]
impl DirectoryService for LdapDirectory {
    async fn authenticate(&self, username: &str, password: &str) -> HerqlesResult<bool> {
        // 空密码会被当作匿名绑定
        if password.is_empty() {
            return Ok(false);
        }

        let mut ldap = self.open().await?;
        let result = ldap
            .simple_bind(&self.config.principal(username), password)
            .await
            .map_err(|e| HerqlesError::directory(format!("LDAP绑定失败: {e}")))?;

        let authenticated = match result.rc {
            0 => true,
            INVALID_CREDENTIALS => false,
            rc => {
                let _ = ldap.unbind().await;
                return Err(HerqlesError::directory(format!(
                    "LDAP绑定返回异常结果: {rc} {}",
                    result.text
                )));
            }
        };

        if let Err(e) = ldap.unbind().await {
            debug!("LDAP解绑失败: {}", e);
        }
        Ok(authenticated)
    }

    async fn find_user(&self, username: &str) -> HerqlesResult<Option<DirectoryEntry>> {
        let mut ldap = self.service_bind().await?;

        let filter = format!("(&(sAMAccountName={}))", ldap_escape(username));
        let (entries, _) = ldap
            .search(
                &self.config.base_dn,
                Scope::Subtree,
                &filter,
                vec!["displayName", "memberOf"],
            )
            .await
            .and_then(|result| result.success())
            .map_err(|e| HerqlesError::directory(format!("LDAP搜索失败: {e}")))?;

        if let Err(e) = ldap.unbind().await {
            debug!("LDAP解绑失败: {}", e);
        }

        let Some(entry) = entries.into_iter().next() else {
            return Ok(None);
        };
        let mut entry = SearchEntry::construct(entry);

        if entry.attrs.is_empty() {
            warn!("LDAP条目没有可读属性: {}", entry.dn);
        }

        Ok(Some(DirectoryEntry {
            username: username.to_string(),
            display_name: entry
                .attrs
                .remove("displayName")
                .and_then(|values| values.into_iter().next()),
            groups: entry.attrs.remove("memberOf").unwrap_or_default(),
        }))
    }

    fn base_dn(&self) -> &str {
        &self.config.base_dn
    }
}
