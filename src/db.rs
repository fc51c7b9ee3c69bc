use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

// ============================================================================
// Database Setup
// ============================================================================

pub async fn connect(database_url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;

    tracing::info!("connected to Postgres");
    Ok(pool)
}

/// Create the schema if it does not exist yet.
///
/// `order_status_history.seq` is the insertion sequence used to break
/// `created_at` ties when replaying the ledger.
pub async fn bootstrap_schema(pool: &PgPool) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS services (
            id UUID PRIMARY KEY,
            freelancer_id UUID NOT NULL,
            title TEXT NOT NULL,
            price BIGINT NOT NULL,
            work_duration_days BIGINT NOT NULL,
            status TEXT NOT NULL,
            rating_average DOUBLE PRECISION NOT NULL DEFAULT 0,
            rating_count BIGINT NOT NULL DEFAULT 0,
            favorite_count BIGINT NOT NULL DEFAULT 0,
            completed_order_count BIGINT NOT NULL DEFAULT 0
        )",
        "CREATE TABLE IF NOT EXISTS service_packages (
            id UUID PRIMARY KEY,
            service_id UUID NOT NULL REFERENCES services(id),
            title TEXT NOT NULL,
            price BIGINT NOT NULL,
            work_duration_days BIGINT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS orders (
            id UUID PRIMARY KEY,
            order_number TEXT NOT NULL UNIQUE,
            client_id UUID NOT NULL,
            freelancer_id UUID NOT NULL,
            service_id UUID NOT NULL,
            package_id UUID,
            price BIGINT NOT NULL,
            platform_fee BIGINT NOT NULL,
            total_due BIGINT NOT NULL,
            work_duration_days BIGINT NOT NULL,
            deadline TIMESTAMPTZ NOT NULL,
            sent_at TIMESTAMPTZ,
            completed_at TIMESTAMPTZ,
            client_notes TEXT,
            client_attachments TEXT NOT NULL DEFAULT '[]',
            freelancer_attachments TEXT NOT NULL DEFAULT '[]',
            freelancer_note TEXT,
            status TEXT NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS order_status_history (
            seq BIGSERIAL PRIMARY KEY,
            id UUID NOT NULL,
            order_id UUID NOT NULL,
            from_status TEXT,
            to_status TEXT NOT NULL,
            changed_by UUID NOT NULL,
            changed_by_role TEXT NOT NULL,
            reason TEXT,
            metadata TEXT NOT NULL DEFAULT '{}',
            created_at TIMESTAMPTZ NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_order_status_history_order
            ON order_status_history(order_id)",
        "CREATE TABLE IF NOT EXISTS reviews (
            id UUID PRIMARY KEY,
            order_id UUID NOT NULL UNIQUE,
            service_id UUID NOT NULL,
            reviewer_id UUID NOT NULL,
            rating INT NOT NULL,
            comment TEXT,
            created_at TIMESTAMPTZ NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_reviews_service ON reviews(service_id)",
        "CREATE TABLE IF NOT EXISTS favorites (
            user_id UUID NOT NULL,
            service_id UUID NOT NULL,
            created_at TIMESTAMPTZ NOT NULL,
            PRIMARY KEY (user_id, service_id)
        )",
    ];

    for statement in statements {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("schema ready");
    Ok(())
}
