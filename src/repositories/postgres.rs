use sqlx::{postgres::PgPoolOptions, PgConnection, PgPool};

#[derive(Clone)]
pub struct PgStore {
    pub(super) conn: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, anyhow::Error> {
        let conn = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        Ok(PgStore { conn })
    }

    pub async fn migrate(&self) -> Result<(), anyhow::Error> {
        sqlx::migrate!("./migrations").run(&self.conn).await?;
        log::info!("Database migrations applied.");

        Ok(())
    }
}

/// Advisory lock keys guarding id allocation on `users` and `transfers`.
pub(super) const USER_SEQUENCE_LOCK: i64 = 0x5245_4653_0001;
pub(super) const TRANSFER_SEQUENCE_LOCK: i64 = 0x5245_4653_0002;

/// Takes `key` until the surrounding transaction ends. Held from the insert
/// that allocates a `BIGSERIAL` id up to commit, it makes rows of that table
/// become visible in id order, so a payout checkpoint can never step over a
/// row that commits later with a smaller id.
pub(super) async fn lock_sequence(conn: &mut PgConnection, key: i64) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(key)
        .execute(&mut *conn)
        .await?;

    Ok(())
}
