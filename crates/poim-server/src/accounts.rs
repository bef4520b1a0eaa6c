//! Registration, login and logout.

use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::info;

use poim_store::accounts::{hash_password, verify_password};
use poim_store::{Database, NewUser, StoreError};

use crate::auth::Auth;
use crate::error::{FieldErrors, ServerError};
use crate::payload::{MSG_BLANK, MSG_REQUIRED};
use crate::view::{AuthView, ProfileView};

const MAX_NAME_LEN: usize = 150;
const MIN_PASSWORD_LEN: usize = 8;

pub const MSG_BAD_CREDENTIALS: &str = "Unable to log in with provided credentials.";
pub const MSG_USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const MSG_EMAIL_TAKEN: &str = "A user with this email is already registered.";
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

/// A registration that passed field validation. The password is still
/// in the clear.
#[derive(Debug)]
struct Registration {
    username: String,
    email: String,
    first_name: String,
    last_name: String,
    password: String,
}

/// Account flows over the shared connection.
///
/// argon2 work runs on the blocking pool with the database unlocked, so a
/// slow hash never stalls other requests.
pub struct AccountService<'a> {
    db: &'a Mutex<Database>,
}

impl<'a> AccountService<'a> {
    pub fn new(db: &'a Mutex<Database>) -> Self {
        Self { db }
    }

    /// Create an account and log it in.
    pub async fn register(&self, open: bool, req: RegisterRequest) -> Result<AuthView, ServerError> {
        if !open {
            return Err(ServerError::Forbidden("Registration is closed".into()));
        }

        let reg = validate_registration(req)?;
        {
            let db = self.db.lock().await;
            let mut errors = FieldErrors::new();
            if db.username_taken(&reg.username)? {
                errors.add("username", MSG_USERNAME_TAKEN);
            }
            if db.email_taken(&reg.email)? {
                errors.add("email", MSG_EMAIL_TAKEN);
            }
            if !errors.is_empty() {
                return Err(errors.into());
            }
        }

        let password = reg.password;
        let password_hash = blocking(move || hash_password(&password)).await??;
        let new = NewUser {
            username: reg.username,
            email: reg.email,
            first_name: reg.first_name,
            last_name: reg.last_name,
            password_hash,
        };

        // A concurrent registration can still win the insert; that one is a 409.
        let db = self.db.lock().await;
        let user = db.create_user(&new)?;
        let token = db.get_or_create_token(user.id)?;

        info!(user_id = %user.id, "account registered");
        Ok(AuthView {
            profile: ProfileView::from(&user),
            auth_token: token.key,
        })
    }

    /// Exchange credentials for the user's token.
    pub async fn login(&self, req: LoginRequest) -> Result<AuthView, ServerError> {
        let mut errors = FieldErrors::new();
        let username = required(req.username, "username", &mut errors);
        let password = required(req.password, "password", &mut errors);
        let (Some(username), Some(password)) = (username, password) else {
            return Err(errors.into());
        };

        let user = match self.db.lock().await.get_user_by_username(&username) {
            Ok(user) => user,
            Err(StoreError::NotFound) => return Err(bad_credentials(&username)),
            Err(e) => return Err(e.into()),
        };

        let hash = user.password_hash.clone();
        if !blocking(move || verify_password(&hash, &password)).await? {
            return Err(bad_credentials(&username));
        }

        let token = self.db.lock().await.get_or_create_token(user.id)?;
        info!(user_id = %user.id, "user logged in");
        Ok(AuthView {
            profile: ProfileView::from(&user),
            auth_token: token.key,
        })
    }

    /// Revoke the token the caller authenticated with.
    pub async fn logout(&self, auth: &Auth) -> Result<(), ServerError> {
        let user = auth.require_user()?;
        if let Some(ref key) = auth.token {
            self.db.lock().await.delete_token(key)?;
        }
        info!(user_id = %user.id, "user logged out");
        Ok(())
    }
}

fn bad_credentials(username: &str) -> ServerError {
    tracing::debug!(%username, "login failed");
    FieldErrors::single(NON_FIELD_ERRORS, MSG_BAD_CREDENTIALS).into()
}

async fn blocking<T, F>(f: F) -> Result<T, ServerError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ServerError::Internal(format!("password task failed: {e}")))
}

fn validate_registration(req: RegisterRequest) -> Result<Registration, FieldErrors> {
    let mut errors = FieldErrors::new();

    let username = required(req.username, "username", &mut errors);
    if let Some(ref u) = username {
        if u.chars().count() > MAX_NAME_LEN {
            errors.add("username", format!("Ensure this field has no more than {MAX_NAME_LEN} characters."));
        } else if !u.chars().all(is_username_char) {
            errors.add(
                "username",
                "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
            );
        }
    }

    let email = required(req.email, "email", &mut errors);
    if let Some(ref e) = email {
        if !is_plausible_email(e) {
            errors.add("email", "Enter a valid email address.");
        }
    }

    let first_name = required(req.first_name, "first_name", &mut errors);
    let last_name = required(req.last_name, "last_name", &mut errors);
    for (field, value) in [("first_name", &first_name), ("last_name", &last_name)] {
        if value.as_ref().is_some_and(|v| v.chars().count() > MAX_NAME_LEN) {
            errors.add(field, format!("Ensure this field has no more than {MAX_NAME_LEN} characters."));
        }
    }

    let password = required(req.password, "password", &mut errors);
    if let Some(ref p) = password {
        if p.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                "password",
                format!("Ensure this field has at least {MIN_PASSWORD_LEN} characters."),
            );
        }
    }

    match (username, email, first_name, last_name, password) {
        (Some(username), Some(email), Some(first_name), Some(last_name), Some(password))
            if errors.is_empty() =>
        {
            Ok(Registration {
                username,
                email,
                first_name,
                last_name,
                password,
            })
        }
        _ => Err(errors),
    }
}

/// A present, non-blank string, trimmed. Passwords are trimmed too, the
/// same way on registration and on login.
fn required(value: Option<String>, field: &str, errors: &mut FieldErrors) -> Option<String> {
    match value.as_deref().map(str::trim) {
        None => {
            errors.add(field, MSG_REQUIRED);
            None
        }
        Some("") => {
            errors.add(field, MSG_BLANK);
            None
        }
        Some(v) => Some(v.to_string()),
    }
}

fn is_username_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')
}

fn is_plausible_email(email: &str) -> bool {
    match email.rsplit_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str) -> RegisterRequest {
        RegisterRequest {
            username: Some(username.into()),
            email: Some(email.into()),
            first_name: Some("Alice".into()),
            last_name: Some("Smith".into()),
            password: Some("correct horse".into()),
        }
    }

    fn login(username: &str, password: &str) -> LoginRequest {
        LoginRequest {
            username: Some(username.into()),
            password: Some(password.into()),
        }
    }

    fn field_errors(err: ServerError) -> Vec<String> {
        match err {
            ServerError::Validation(errors) => errors.fields().map(str::to_string).collect(),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn register_then_login() {
        let db = Mutex::new(Database::open_in_memory().unwrap());
        let service = AccountService::new(&db);

        let registered = service.register(true, request("alice", "alice@example.com")).await.unwrap();
        assert_eq!(registered.profile.username, "alice");
        assert!(registered.profile.has_usable_password);
        assert_eq!(registered.auth_token.len(), 40);

        let logged_in = service.login(login("alice", "correct horse")).await.unwrap();
        assert_eq!(logged_in.auth_token, registered.auth_token);
        assert_eq!(logged_in.profile, registered.profile);
    }

    #[tokio::test]
    async fn passwords_are_trimmed_on_both_ends() {
        let db = Mutex::new(Database::open_in_memory().unwrap());
        let service = AccountService::new(&db);
        let mut req = request("alice", "alice@example.com");
        req.password = Some("  correct horse\t".into());
        service.register(true, req).await.unwrap();

        service.login(login("alice", "correct horse")).await.unwrap();
        service.login(login(" alice ", " correct horse ")).await.unwrap();

        let err = service.login(login("alice", "  ")).await.unwrap_err();
        assert_eq!(field_errors(err), vec!["password"]);
    }

    #[tokio::test]
    async fn bad_credentials_are_a_non_field_error() {
        let db = Mutex::new(Database::open_in_memory().unwrap());
        let service = AccountService::new(&db);
        service.register(true, request("alice", "alice@example.com")).await.unwrap();

        for (username, password) in [("alice", "wrong password"), ("nobody", "correct horse")] {
            let err = service.login(login(username, password)).await.unwrap_err();
            assert_eq!(field_errors(err), vec![NON_FIELD_ERRORS]);
        }
    }

    #[test]
    fn registration_validation() {
        let errors = validate_registration(RegisterRequest::default()).unwrap_err();
        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            vec!["email", "first_name", "last_name", "password", "username"]
        );

        let mut req = request("bad name!", "not-an-email");
        req.password = Some("short".into());
        let errors = validate_registration(req).unwrap_err();
        assert_eq!(
            errors.fields().collect::<Vec<_>>(),
            vec!["email", "password", "username"]
        );

        // Seven characters once the padding is gone.
        let mut req = request("alice", "alice@example.com");
        req.password = Some("  1234567  ".into());
        let errors = validate_registration(req).unwrap_err();
        assert_eq!(errors.fields().collect::<Vec<_>>(), vec!["password"]);

        assert!(validate_registration(request("a.b+c-d_e@f", "x@y.z")).is_ok());
    }

    #[tokio::test]
    async fn taken_username_and_email_are_field_errors() {
        let db = Mutex::new(Database::open_in_memory().unwrap());
        let service = AccountService::new(&db);
        service.register(true, request("alice", "alice@example.com")).await.unwrap();

        let err = service.register(true, request("alice", "alice@example.com")).await.unwrap_err();
        assert_eq!(field_errors(err), vec!["email", "username"]);

        let err = service.register(true, request("alice", "other@example.com")).await.unwrap_err();
        assert_eq!(field_errors(err), vec!["username"]);

        let err = service.register(true, request("alice2", "ALICE@example.com")).await.unwrap_err();
        assert_eq!(field_errors(err), vec!["email"]);

        assert!(matches!(
            service.register(false, request("bob", "bob@example.com")).await,
            Err(ServerError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn lost_insert_race_is_a_conflict() {
        let db = Mutex::new(Database::open_in_memory().unwrap());
        let service = AccountService::new(&db);
        let first = service.register(true, request("alice", "alice@example.com")).await.unwrap();

        // Same rows as a concurrent registration that passed the field checks.
        let err = db
            .lock()
            .await
            .create_user(&NewUser {
                username: "alice".into(),
                email: "elsewhere@example.com".into(),
                first_name: "Alice".into(),
                last_name: "Smith".into(),
                password_hash: hash_password("correct horse").unwrap(),
            })
            .unwrap_err();
        assert!(matches!(ServerError::from(err), ServerError::Conflict(_)));
        assert_eq!(first.profile.username, "alice");
    }

    #[tokio::test]
    async fn logout_revokes_token() {
        let db = Mutex::new(Database::open_in_memory().unwrap());
        let service = AccountService::new(&db);
        let registered = service.register(true, request("alice", "alice@example.com")).await.unwrap();

        let user = db.lock().await.user_for_token(&registered.auth_token).unwrap();
        let auth = Auth {
            principal: poim_shared::Principal::User(user.account()),
            user: Some(user),
            token: Some(registered.auth_token.clone()),
        };
        service.logout(&auth).await.unwrap();
        assert!(matches!(
            db.lock().await.user_for_token(&registered.auth_token),
            Err(StoreError::NotFound)
        ));

        assert!(matches!(
            service.logout(&Auth::anonymous()).await,
            Err(ServerError::Unauthenticated)
        ));
    }
}
