use sqlx::postgres::{PgPool, PgPoolOptions};

fn table_name(schema: &Option<String>, name: &str) -> String {
    match schema {
        Some(s) => format!("{s}.{name}"),
        None => name.to_string(),
    }
}

pub async fn connect(db_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .connect(db_url)
        .await
}

pub async fn ensure_schema(pool: &PgPool, db_schema: &Option<String>) -> Result<(), sqlx::Error> {
    if let Some(schema) = db_schema {
        let ddl = format!("CREATE SCHEMA IF NOT EXISTS {schema}");
        let _ = sqlx::query(&ddl).execute(pool).await;
    }

    let users = table_name(db_schema, "users");
    let bookings = table_name(db_schema, "bookings");
    let payments = table_name(db_schema, "payments");
    let assignments = table_name(db_schema, "taxi_assignments");
    let adjustments = table_name(db_schema, "fare_adjustments");
    let notes = table_name(db_schema, "booking_notes");
    let audit = table_name(db_schema, "audit_log");
    let fleet = table_name(db_schema, "fleet_vehicles");
    let reset_otps = table_name(db_schema, "password_reset_otps");

    let ddls = [
        format!(
            "CREATE TABLE IF NOT EXISTS {users} (\
             id VARCHAR(36) PRIMARY KEY,\
             email VARCHAR(254) NOT NULL UNIQUE,\
             password_hash VARCHAR(255) NOT NULL,\
             name VARCHAR(120),\
             phone VARCHAR(32),\
             role VARCHAR(24) NOT NULL DEFAULT 'customer',\
             created_at TEXT\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {bookings} (\
             id VARCHAR(36) PRIMARY KEY,\
             user_id VARCHAR(36) NOT NULL,\
             pickup_location VARCHAR(255) NOT NULL,\
             drop_location VARCHAR(255) NOT NULL,\
             scheduled_at TEXT,\
             distance_km DOUBLE PRECISION,\
             estimated_fare DOUBLE PRECISION,\
             total_amount DOUBLE PRECISION NOT NULL,\
             actual_km DOUBLE PRECISION,\
             extra_km DOUBLE PRECISION,\
             extra_charge DOUBLE PRECISION,\
             car_model VARCHAR(120),\
             cancellation_reason VARCHAR(512),\
             taxi_assign_status VARCHAR(16),\
             status VARCHAR(20) NOT NULL DEFAULT 'PENDING_PAYMENT',\
             created_at TEXT,\
             updated_at TEXT\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {payments} (\
             id VARCHAR(36) PRIMARY KEY,\
             booking_id VARCHAR(36) NOT NULL,\
             amount DOUBLE PRECISION NOT NULL,\
             currency VARCHAR(8) NOT NULL DEFAULT 'INR',\
             status VARCHAR(16) NOT NULL,\
             provider VARCHAR(32),\
             provider_txn_id VARCHAR(128),\
             remaining_amount DOUBLE PRECISION,\
             created_at TEXT\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {assignments} (\
             id VARCHAR(36) PRIMARY KEY,\
             booking_id VARCHAR(36) NOT NULL,\
             driver_name VARCHAR(120) NOT NULL,\
             driver_number VARCHAR(32) NOT NULL,\
             cab_number VARCHAR(32) NOT NULL,\
             cab_name VARCHAR(120) NOT NULL,\
             created_at TEXT,\
             updated_at TEXT\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {adjustments} (\
             id VARCHAR(36) PRIMARY KEY,\
             booking_id VARCHAR(36) NOT NULL,\
             kind VARCHAR(16) NOT NULL,\
             amount DOUBLE PRECISION NOT NULL,\
             description VARCHAR(255),\
             admin_id VARCHAR(36),\
             created_at TEXT\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {notes} (\
             id VARCHAR(36) PRIMARY KEY,\
             booking_id VARCHAR(36) NOT NULL,\
             admin_id VARCHAR(36),\
             content TEXT NOT NULL,\
             created_at TEXT\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {audit} (\
             id VARCHAR(36) PRIMARY KEY,\
             entity_type VARCHAR(24) NOT NULL,\
             entity_id VARCHAR(36) NOT NULL,\
             action VARCHAR(24) NOT NULL,\
             old_value TEXT,\
             new_value TEXT,\
             admin_id VARCHAR(36),\
             reason VARCHAR(512),\
             created_at TEXT\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {fleet} (\
             id VARCHAR(36) PRIMARY KEY,\
             name VARCHAR(120) NOT NULL,\
             seats INTEGER NOT NULL,\
             base_price_per_km DOUBLE PRECISION NOT NULL,\
             category VARCHAR(48) NOT NULL,\
             description VARCHAR(1024),\
             image_url VARCHAR(512),\
             is_active INTEGER NOT NULL DEFAULT 1,\
             created_at TEXT,\
             updated_at TEXT\
             )"
        ),
        format!(
            "CREATE TABLE IF NOT EXISTS {reset_otps} (\
             id VARCHAR(36) PRIMARY KEY,\
             user_id VARCHAR(36) NOT NULL,\
             otp_hash VARCHAR(255) NOT NULL,\
             expires_at TEXT NOT NULL,\
             attempts INTEGER NOT NULL DEFAULT 0,\
             verified INTEGER NOT NULL DEFAULT 0,\
             created_at TEXT\
             )"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_bookings_user ON {bookings}(user_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_bookings_status ON {bookings}(status)"),
        format!("CREATE INDEX IF NOT EXISTS idx_bookings_created_at ON {bookings}(created_at)"),
        format!("CREATE INDEX IF NOT EXISTS idx_payments_booking ON {payments}(booking_id)"),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_payments_provider_txn ON {payments}(provider_txn_id)"
        ),
        format!("CREATE INDEX IF NOT EXISTS idx_assignments_booking ON {assignments}(booking_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_adjustments_booking ON {adjustments}(booking_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_notes_booking ON {notes}(booking_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_audit_entity ON {audit}(entity_type, entity_id)"),
        format!("CREATE INDEX IF NOT EXISTS idx_fleet_category ON {fleet}(category)"),
    ];

    for ddl in ddls {
        let _ = sqlx::query(&ddl).execute(pool).await;
    }

    let _ = sqlx::query(&format!(
        "ALTER TABLE {bookings} ADD COLUMN IF NOT EXISTS car_model VARCHAR(120)"
    ))
    .execute(pool)
    .await;
    let _ = sqlx::query(&format!(
        "ALTER TABLE {bookings} ADD COLUMN IF NOT EXISTS taxi_assign_status VARCHAR(16)"
    ))
    .execute(pool)
    .await;
    let _ = sqlx::query(&format!(
        "ALTER TABLE {payments} ADD COLUMN IF NOT EXISTS remaining_amount DOUBLE PRECISION"
    ))
    .execute(pool)
    .await;

    Ok(())
}
