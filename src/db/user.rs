use serde::Serialize;
use sqlx::sqlite::SqlitePool;

/// Placeholder avatar for new profiles.
pub const DEFAULT_AVATAR: &str =
    "https://storage.googleapis.com/twitter-clone-347513.appspot.com/images/default_avatar.jpg";

#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

/// User role for authorization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    Student,
    Faculty,
    Admin,
}

impl UserRole {
    pub fn from_str(s: &str) -> Self {
        match s {
            "admin" => UserRole::Admin,
            "faculty" => UserRole::Faculty,
            _ => UserRole::Student,
        }
    }
}

/// How the account was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Email,
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Email => "email",
            Provider::Google => "google",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "google" => Provider::Google,
            _ => Provider::Email,
        }
    }
}

/// Full user record, including the password hash. Never serialized.
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub hashed_password: Option<String>,
    pub google_id: Option<String>,
    pub provider: Provider,
    pub role: UserRole,
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    email: String,
    username: String,
    hashed_password: Option<String>,
    google_id: Option<String>,
    provider: String,
    role: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            hashed_password: row.hashed_password,
            google_id: row.google_id,
            provider: Provider::from_str(&row.provider),
            role: UserRole::from_str(&row.role),
        }
    }
}

/// The fields verification needs to build an auth context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: i64,
    pub organization_id: Option<i64>,
    pub department_id: Option<i64>,
    pub role: UserRole,
}

#[derive(sqlx::FromRow)]
struct IdentityRow {
    id: i64,
    organization_id: Option<i64>,
    department_id: Option<i64>,
    role: String,
}

impl From<IdentityRow> for Identity {
    fn from(row: IdentityRow) -> Self {
        Self {
            id: row.id,
            organization_id: row.organization_id,
            department_id: row.department_id,
            role: UserRole::from_str(&row.role),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub name: String,
    pub img: String,
    pub dob: Option<String>,
}

/// User projection returned by login and refresh. Does not expose the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: i64,
    pub email: String,
    pub username: String,
    pub new_user: bool,
    pub google_id: Option<String>,
    pub provider: Provider,
    pub created_at: String,
    pub profile: Option<Profile>,
    pub organization_id: Option<i64>,
    pub department_id: Option<i64>,
    pub role: UserRole,
    pub academic_year: Option<i64>,
    pub roll_number: Option<String>,
}

#[derive(sqlx::FromRow)]
struct UserProfileRow {
    id: i64,
    email: String,
    username: String,
    new_user: i32,
    google_id: Option<String>,
    provider: String,
    created_at: String,
    organization_id: Option<i64>,
    department_id: Option<i64>,
    role: String,
    academic_year: Option<i64>,
    roll_number: Option<String>,
    name: Option<String>,
    img: Option<String>,
    dob: Option<String>,
}

impl From<UserProfileRow> for UserProfile {
    fn from(row: UserProfileRow) -> Self {
        let profile = match (row.name, row.img) {
            (Some(name), Some(img)) => Some(Profile {
                name,
                img,
                dob: row.dob,
            }),
            _ => None,
        };
        Self {
            id: row.id,
            email: row.email,
            username: row.username,
            new_user: row.new_user != 0,
            google_id: row.google_id,
            provider: Provider::from_str(&row.provider),
            created_at: row.created_at,
            profile,
            organization_id: row.organization_id,
            department_id: row.department_id,
            role: UserRole::from_str(&row.role),
            academic_year: row.academic_year,
            roll_number: row.roll_number,
        }
    }
}

/// Everything needed to insert a user and its profile.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub hashed_password: Option<String>,
    pub google_id: Option<String>,
    pub provider: Provider,
    pub organization_id: Option<i64>,
    pub department_id: Option<i64>,
    pub academic_year: Option<i64>,
    pub roll_number: Option<String>,
    pub name: String,
}

impl NewUser {
    /// A password account with no campus affiliation yet.
    pub fn password(email: &str, username: &str, hashed_password: &str, name: &str) -> Self {
        Self {
            email: email.to_lowercase(),
            username: username.to_lowercase(),
            hashed_password: Some(hashed_password.to_string()),
            google_id: None,
            provider: Provider::Email,
            organization_id: None,
            department_id: None,
            academic_year: None,
            roll_number: None,
            name: name.to_string(),
        }
    }

    /// A federated account; it has no password.
    pub fn google(email: &str, username: &str, google_id: &str, name: &str) -> Self {
        Self {
            email: email.to_lowercase(),
            username: username.to_lowercase(),
            hashed_password: None,
            google_id: Some(google_id.to_string()),
            provider: Provider::Google,
            organization_id: None,
            department_id: None,
            academic_year: None,
            roll_number: None,
            name: name.to_string(),
        }
    }
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a user together with its profile. Returns the user ID.
    pub async fn create(&self, user: &NewUser) -> Result<i64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            "INSERT INTO users (email, username, hashed_password, google_id, provider, organization_id, department_id, academic_year, roll_number)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.email)
        .bind(&user.username)
        .bind(&user.hashed_password)
        .bind(&user.google_id)
        .bind(user.provider.as_str())
        .bind(user.organization_id)
        .bind(user.department_id)
        .bind(user.academic_year)
        .bind(&user.roll_number)
        .execute(&mut *tx)
        .await?;
        let id = result.last_insert_rowid();

        sqlx::query("INSERT INTO profiles (user_id, name, img) VALUES (?, ?, ?)")
            .bind(id)
            .bind(&user.name)
            .bind(DEFAULT_AVATAR)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(id)
    }

    /// Get a user by email (case-insensitive).
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, username, hashed_password, google_id, provider, role FROM users WHERE email = ?",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by username (case-insensitive).
    pub async fn get_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, username, hashed_password, google_id, provider, role FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Get a user by ID.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, email, username, hashed_password, google_id, provider, role FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }

    /// Load the minimal projection used to build an auth context.
    pub async fn get_identity(&self, id: i64) -> Result<Option<Identity>, sqlx::Error> {
        let row: Option<IdentityRow> = sqlx::query_as(
            "SELECT id, organization_id, department_id, role FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Identity::from))
    }

    /// Load the projection returned alongside an access token.
    pub async fn get_profile(&self, id: i64) -> Result<Option<UserProfile>, sqlx::Error> {
        let row: Option<UserProfileRow> = sqlx::query_as(
            "SELECT u.id, u.email, u.username, u.new_user, u.google_id, u.provider, u.created_at,
                    u.organization_id, u.department_id, u.role, u.academic_year, u.roll_number,
                    p.name, p.img, p.dob
             FROM users u LEFT JOIN profiles p ON p.user_id = u.id
             WHERE u.id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(UserProfile::from))
    }

    /// Check if an email is free to register.
    pub async fn is_email_available(&self, email: &str) -> Result<bool, sqlx::Error> {
        let count: (i32,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0 == 0)
    }

    /// Replace the password hash.
    pub async fn set_password(&self, id: i64, hashed_password: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET hashed_password = ? WHERE id = ?")
            .bind(hashed_password)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record the date of birth and finish onboarding.
    pub async fn set_date_of_birth(&self, id: i64, dob: &str) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE users SET new_user = 0 WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("UPDATE profiles SET dob = ? WHERE user_id = ?")
            .bind(dob)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Change the username and finish onboarding. Fails on a taken username.
    pub async fn set_username(&self, id: i64, username: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET username = ?, new_user = 0 WHERE id = ?")
            .bind(username.to_lowercase())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete a user by ID. Their sessions are left for cleanup.
    pub async fn delete(&self, id: i64) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::db::Database;

    use super::*;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create(&NewUser::password("Alice@Uni.edu", "alice1234567890", "hash", "Alice Smith"))
            .await
            .unwrap();

        let user = db.users().get_by_email("alice@uni.edu").await.unwrap().unwrap();
        assert_eq!(user.id, id);
        assert_eq!(user.username, "alice1234567890");
        assert_eq!(user.hashed_password.as_deref(), Some("hash"));
        assert_eq!(user.provider, Provider::Email);
        assert_eq!(user.role, UserRole::Student);

        let user = db.users().get_by_username("ALICE1234567890").await.unwrap().unwrap();
        assert_eq!(user.id, id);
    }

    #[tokio::test]
    async fn test_duplicate_email_fails() {
        let db = Database::open(":memory:").await.unwrap();

        db.users()
            .create(&NewUser::password("a@uni.edu", "a1", "hash", "A"))
            .await
            .unwrap();
        let result = db
            .users()
            .create(&NewUser::password("A@uni.edu", "a2", "hash", "A"))
            .await;

        assert!(result.is_err());
        assert!(!db.users().is_email_available("a@uni.edu").await.unwrap());
    }

    #[tokio::test]
    async fn test_identity_projection() {
        let db = Database::open(":memory:").await.unwrap();
        let org = db.organizations().find_or_create("Tech Uni").await.unwrap();
        let dept = db
            .organizations()
            .find_or_create_department(org.id, "Physics")
            .await
            .unwrap();

        let mut new_user = NewUser::password("b@tech.edu", "b1", "hash", "B");
        new_user.organization_id = Some(org.id);
        new_user.department_id = Some(dept.id);
        let id = db.users().create(&new_user).await.unwrap();
        // Roles are assigned outside this service.
        sqlx::query("UPDATE users SET role = 'faculty' WHERE id = ?")
            .bind(id)
            .execute(&db.users().pool)
            .await
            .unwrap();

        let identity = db.users().get_identity(id).await.unwrap().unwrap();
        assert_eq!(
            identity,
            Identity {
                id,
                organization_id: Some(org.id),
                department_id: Some(dept.id),
                role: UserRole::Faculty,
            }
        );
    }

    #[tokio::test]
    async fn test_profile_projection_serializes_camel_case() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(&NewUser::google("g@gmail.com", "g1", "google-sub", "Gina"))
            .await
            .unwrap();

        let profile = db.users().get_profile(id).await.unwrap().unwrap();
        assert_eq!(profile.provider, Provider::Google);
        assert_eq!(profile.profile.as_ref().unwrap().name, "Gina");
        assert!(profile.new_user);

        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["googleId"], "google-sub");
        assert_eq!(json["newUser"], true);
        assert_eq!(json["role"], "student");
        assert!(json.get("hashedPassword").is_none());
    }

    #[tokio::test]
    async fn test_onboarding_updates() {
        let db = Database::open(":memory:").await.unwrap();
        let id = db
            .users()
            .create(&NewUser::password("d@uni.edu", "d1", "hash", "D"))
            .await
            .unwrap();
        db.users()
            .create(&NewUser::password("e@uni.edu", "taken", "hash", "E"))
            .await
            .unwrap();

        assert!(db.users().set_date_of_birth(id, "2001-04-09").await.unwrap());
        let profile = db.users().get_profile(id).await.unwrap().unwrap();
        assert!(!profile.new_user);
        assert_eq!(profile.profile.unwrap().dob.as_deref(), Some("2001-04-09"));

        assert!(db.users().set_username(id, "NewName").await.unwrap());
        assert_eq!(db.users().get_by_id(id).await.unwrap().unwrap().username, "newname");
        assert!(db.users().set_username(id, "TAKEN").await.is_err());

        assert!(!db.users().set_date_of_birth(9999, "2001-04-09").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_user() {
        let db = Database::open(":memory:").await.unwrap();

        let id = db
            .users()
            .create(&NewUser::password("c@uni.edu", "c1", "hash", "C"))
            .await
            .unwrap();
        db.users().delete(id).await.unwrap();

        assert!(db.users().get_by_id(id).await.unwrap().is_none());
        assert!(db.users().get_identity(id).await.unwrap().is_none());
    }
}
