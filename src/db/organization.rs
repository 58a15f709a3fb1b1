//! Campus organizations and their departments.

use sqlx::sqlite::SqlitePool;

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Organization {
    pub id: i64,
    pub name: String,
    pub domain: String,
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Department {
    pub id: i64,
    pub name: String,
    pub organization_id: i64,
}

/// Derive the unique domain key for an organization name.
/// "Tech Uni" becomes "techuni.edu".
pub fn organization_domain(name: &str) -> String {
    let slug: String = name
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    format!("{}.edu", slug)
}

pub struct OrganizationStore {
    pool: SqlitePool,
}

impl OrganizationStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Return the organization for `name`, creating it on first use.
    pub async fn find_or_create(&self, name: &str) -> Result<Organization, sqlx::Error> {
        let domain = organization_domain(name);

        sqlx::query("INSERT INTO organizations (name, domain) VALUES (?, ?) ON CONFLICT(domain) DO NOTHING")
            .bind(name)
            .bind(&domain)
            .execute(&self.pool)
            .await?;

        sqlx::query_as("SELECT id, name, domain FROM organizations WHERE domain = ?")
            .bind(&domain)
            .fetch_one(&self.pool)
            .await
    }

    /// Return the department `name` within an organization, creating it on first use.
    pub async fn find_or_create_department(
        &self,
        organization_id: i64,
        name: &str,
    ) -> Result<Department, sqlx::Error> {
        sqlx::query(
            "INSERT INTO departments (name, organization_id) VALUES (?, ?) ON CONFLICT(organization_id, name) DO NOTHING",
        )
        .bind(name)
        .bind(organization_id)
        .execute(&self.pool)
        .await?;

        sqlx::query_as(
            "SELECT id, name, organization_id FROM departments WHERE organization_id = ? AND name = ?",
        )
        .bind(organization_id)
        .bind(name)
        .fetch_one(&self.pool)
        .await
    }
}
