pub mod models;

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use models::{Project, ProjectRow, User, PROJECT_SELECT};

#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        // An in-memory database lives and dies with its one connection.
        if url.contains(":memory:") {
            let pool = SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect(url)
                .await?;
            return Ok(Self { pool });
        }

        // Ensure the data directory exists
        if let Some(path) = url.strip_prefix("sqlite:") {
            let path = path.split('?').next().unwrap_or(path);
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub async fn user_by_id(&self, id: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn user_by_email(&self, email: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await
    }

    /// Whether `username` or `email` is held by any user other than `except_id`.
    pub async fn identity_taken(
        &self,
        username: Option<&str>,
        email: Option<&str>,
        except_id: Option<&str>,
    ) -> sqlx::Result<IdentityClash> {
        let rows = sqlx::query_as::<_, (String, String)>(
            "SELECT username, email FROM users WHERE (username = ? OR email = ?) AND id != ?",
        )
        .bind(username)
        .bind(email)
        .bind(except_id.unwrap_or(""))
        .fetch_all(&self.pool)
        .await?;

        Ok(IdentityClash {
            username: username.is_some_and(|u| rows.iter().any(|(name, _)| name == u)),
            email: email.is_some_and(|e| rows.iter().any(|(_, mail)| mail == e)),
        })
    }

    pub async fn project_by_id(&self, id: &str) -> sqlx::Result<Option<Project>> {
        let row = sqlx::query_as::<_, ProjectRow>(&format!("{PROJECT_SELECT} WHERE p.id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Project::from))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IdentityClash {
    pub username: bool,
    pub email: bool,
}

impl IdentityClash {
    pub fn any(&self) -> bool {
        self.username || self.email
    }
}

/// Text stored in a `search_key` column. SQLite only folds ASCII case in
/// `LIKE`, so the columns hold a Unicode-lowercased copy of the searchable
/// fields and [`like_pattern`] lowercases the term the same way.
pub fn search_key(fields: &[&str]) -> String {
    fields.join("\n").to_lowercase()
}

/// Lowercases and escapes the term for a substring match against a
/// `search_key` column. Use together with `ESCAPE '\'`.
pub fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.to_lowercase().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}
