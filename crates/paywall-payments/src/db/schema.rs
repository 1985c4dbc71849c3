use rusqlite::Connection;

/// Initialize the ledger, catalog and entitlement schema
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        -- Subscription plans
        CREATE TABLE IF NOT EXISTS plans (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            access_tier TEXT NOT NULL CHECK (access_tier IN ('FREE', 'BASIC', 'PREMIUM', 'VIP')),
            monthly_price_cents INTEGER NOT NULL,
            annual_price_cents INTEGER NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1
        );

        -- Media catalog (access-relevant fields only; bytes live in object storage)
        CREATE TABLE IF NOT EXISTS media (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            access_tier TEXT NOT NULL CHECK (access_tier IN ('FREE', 'BASIC', 'PREMIUM', 'VIP')),
            price_cents INTEGER,
            is_purchaseable INTEGER NOT NULL DEFAULT 0,
            content_url TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );

        -- Direct messages (PPV-relevant fields only)
        CREATE TABLE IF NOT EXISTS messages (
            id TEXT PRIMARY KEY,
            sender_id TEXT NOT NULL,
            is_ppv INTEGER NOT NULL DEFAULT 0,
            ppv_price_cents INTEGER,
            total_tips_cents INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL
        );

        -- Who unlocked which PPV message: an append-only set
        CREATE TABLE IF NOT EXISTS message_unlocks (
            message_id TEXT NOT NULL REFERENCES messages(id),
            user_id TEXT NOT NULL,
            unlocked_at INTEGER NOT NULL,
            PRIMARY KEY (message_id, user_id)
        );

        -- Payment ledger: one row per payment attempt, never deleted
        CREATE TABLE IF NOT EXISTS payments (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            amount_cents INTEGER NOT NULL,
            currency TEXT NOT NULL,
            provider TEXT NOT NULL CHECK (provider IN ('CARD', 'CRYPTO')),
            provider_tx_id TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('PENDING', 'COMPLETED', 'FAILED', 'REFUNDED')),
            kind TEXT NOT NULL CHECK (kind IN ('SUBSCRIPTION', 'MEDIA_PURCHASE', 'PPV_UNLOCK', 'TIP')),
            metadata TEXT NOT NULL,
            provider_details TEXT NOT NULL DEFAULT '{}',
            provider_status TEXT,
            provider_checked_at INTEGER,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (provider, provider_tx_id)
        );
        CREATE INDEX IF NOT EXISTS idx_payments_user ON payments(user_id);

        -- Subscriptions: one row per (user, plan, rail), extended on renewal
        CREATE TABLE IF NOT EXISTS subscriptions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            plan_id TEXT NOT NULL REFERENCES plans(id),
            provider TEXT NOT NULL CHECK (provider IN ('CARD', 'CRYPTO')),
            status TEXT NOT NULL CHECK (status IN ('ACTIVE', 'CANCELED', 'EXPIRED')),
            billing_interval TEXT NOT NULL CHECK (billing_interval IN ('MONTHLY', 'ANNUAL')),
            current_period_start INTEGER NOT NULL,
            current_period_end INTEGER NOT NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            UNIQUE (user_id, plan_id, provider)
        );
        CREATE INDEX IF NOT EXISTS idx_subscriptions_user ON subscriptions(user_id);

        -- Individually purchased media: a user owns an item at most once
        CREATE TABLE IF NOT EXISTS media_purchases (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            media_id TEXT NOT NULL REFERENCES media(id),
            amount_cents INTEGER NOT NULL,
            provider TEXT NOT NULL CHECK (provider IN ('CARD', 'CRYPTO')),
            provider_tx_id TEXT NOT NULL,
            payment_id TEXT NOT NULL REFERENCES payments(id),
            status TEXT NOT NULL CHECK (status IN ('PENDING', 'COMPLETED', 'FAILED', 'REFUNDED')),
            created_at INTEGER NOT NULL,
            UNIQUE (user_id, media_id)
        );

        -- PPV unlocks and tips attached to messages
        CREATE TABLE IF NOT EXISTS message_payments (
            id TEXT PRIMARY KEY,
            message_id TEXT NOT NULL REFERENCES messages(id),
            user_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('PPV_UNLOCK', 'TIP')),
            amount_cents INTEGER NOT NULL,
            provider TEXT NOT NULL CHECK (provider IN ('CARD', 'CRYPTO')),
            payment_id TEXT NOT NULL UNIQUE REFERENCES payments(id),
            status TEXT NOT NULL CHECK (status IN ('PENDING', 'COMPLETED', 'FAILED', 'REFUNDED')),
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_message_payments_message ON message_payments(message_id);
        -- At most one PPV unlock payment per (message, user); tips are unbounded
        CREATE UNIQUE INDEX IF NOT EXISTS idx_message_payments_ppv
            ON message_payments(message_id, user_id) WHERE kind = 'PPV_UNLOCK';
        "#,
    )
}
