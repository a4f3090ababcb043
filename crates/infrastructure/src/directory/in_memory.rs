use async_trait::async_trait;
use herqles_core::{
    traits::{DirectoryEntry, DirectoryService},
    HerqlesResult,
};
use std::collections::HashMap;

struct StoredUser {
    password: String,
    entry: DirectoryEntry,
}

/// 进程内目录，内容在构建时固定
#[derive(Default)]
pub struct InMemoryDirectory {
    base_dn: String,
    users: HashMap<String, StoredUser>,
}

impl InMemoryDirectory {
    pub fn new(base_dn: impl Into<String>) -> Self {
        Self {
            base_dn: base_dn.into(),
            users: HashMap::new(),
        }
    }

    /// `groups` are full distinguished names
    pub fn with_user(mut self, username: &str, password: &str, groups: &[&str]) -> Self {
        self.users.insert(
            username.to_string(),
            StoredUser {
                password: password.to_string(),
                entry: DirectoryEntry {
                    username: username.to_string(),
                    display_name: Some(username.to_string()),
                    groups: groups.iter().map(|g| g.to_string()).collect(),
                },
            },
        );
        self
    }
}

#[async_trait]
impl DirectoryService for InMemoryDirectory {
    async fn authenticate(&self, username: &str, password: &str) -> HerqlesResult<bool> {
        Ok(self
            .users
            .get(username)
            .map(|user| !password.is_empty() && user.password == password)
            .unwrap_or(false))
    }

    async fn find_user(&self, username: &str) -> HerqlesResult<Option<DirectoryEntry>> {
        Ok(self.users.get(username).map(|user| user.entry.clone()))
    }

    fn base_dn(&self) -> &str {
        &self.base_dn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lookup_and_authenticate() {
        let directory = InMemoryDirectory::new("DC=example,DC=com")
            .with_user("bob", "pw", &["CN=Ops,DC=example,DC=com"]);

        assert!(directory.authenticate("bob", "pw").await.unwrap());
        assert!(!directory.authenticate("bob", "").await.unwrap());
        assert!(!directory.authenticate("eve", "pw").await.unwrap());

        let entry = directory.find_user("bob").await.unwrap().unwrap();
        assert_eq!(entry.groups, vec!["CN=Ops,DC=example,DC=com".to_string()]);
        assert!(directory.find_user("eve").await.unwrap().is_none());
    }
}
