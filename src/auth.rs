use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;

/// Two credentials: the admin user logs in with the admin password, every
/// other user name is a customer session sharing the customer password.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub password: String,
    pub admin_user: String,
    pub admin_password: String,
}

impl Credentials {
    pub fn is_admin(&self, user: Option<&str>) -> bool {
        user == Some(self.admin_user.as_str())
    }
}

#[derive(Debug)]
pub struct SlotchainAuthSource {
    credentials: Credentials,
}

impl SlotchainAuthSource {
    pub fn new(credentials: Credentials) -> Self {
        Self { credentials }
    }
}

#[async_trait]
impl AuthSource for SlotchainAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        let expected = if self.credentials.is_admin(login.user()) {
            &self.credentials.admin_password
        } else {
            &self.credentials.password
        };
        Ok(Password::new(None, expected.as_bytes().to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_is_matched_by_exact_user_name() {
        let creds = Credentials {
            password: "p".into(),
            admin_user: "admin".into(),
            admin_password: "a".into(),
        };
        assert!(creds.is_admin(Some("admin")));
        assert!(!creds.is_admin(Some("Admin")));
        assert!(!creds.is_admin(Some("customer")));
        assert!(!creds.is_admin(None));
    }
}
