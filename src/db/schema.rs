//! SQL schema for the ABR search store.
//!
//! Executed at startup by both binaries; idempotent thanks to
//! `IF NOT EXISTS` and `CREATE OR REPLACE`.

use sqlx::PgPool;

/// Full schema DDL.
///
/// `search_tokens` is owned by the store: a before-write trigger rebuilds it
/// from the name and address fields with three-tier weighting (entity name
/// highest, person names middle, address lowest). Application code never
/// assigns or reads the column directly.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS businesses (
    id                  BIGSERIAL PRIMARY KEY,
    abn                 VARCHAR(11) NOT NULL UNIQUE,
    abn_status          VARCHAR(3) NOT NULL,
    abn_status_from     DATE,
    entity_type_code    VARCHAR(4) NOT NULL,
    entity_type_text    TEXT,
    entity_name         TEXT NOT NULL,
    given_name          TEXT,
    family_name         TEXT,
    state               VARCHAR(3),
    postcode            VARCHAR(4),
    gst_status          VARCHAR(3),
    gst_from_date       DATE,
    acn                 VARCHAR(9),
    record_last_updated DATE,
    search_tokens       TSVECTOR,
    created_at          TIMESTAMPTZ NOT NULL DEFAULT now(),
    updated_at          TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS business_names (
    id          BIGSERIAL PRIMARY KEY,
    business_id BIGINT NOT NULL REFERENCES businesses(id) ON DELETE CASCADE,
    name_type   VARCHAR(3) NOT NULL,
    name_text   TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS businesses_search_tokens_idx
    ON businesses USING GIN (search_tokens);
CREATE INDEX IF NOT EXISTS businesses_abn_status_idx
    ON businesses (abn_status);
CREATE INDEX IF NOT EXISTS businesses_entity_type_code_idx
    ON businesses (entity_type_code);
CREATE INDEX IF NOT EXISTS businesses_state_idx
    ON businesses (state);
CREATE INDEX IF NOT EXISTS businesses_postcode_idx
    ON businesses (postcode);
CREATE INDEX IF NOT EXISTS business_names_business_id_idx
    ON business_names (business_id);

CREATE OR REPLACE FUNCTION businesses_refresh_search_tokens() RETURNS trigger AS $$
BEGIN
    NEW.search_tokens :=
        setweight(to_tsvector('english', coalesce(NEW.entity_name, '')), 'A') ||
        setweight(to_tsvector('english',
            coalesce(NEW.given_name, '') || ' ' || coalesce(NEW.family_name, '')), 'B') ||
        setweight(to_tsvector('english',
            coalesce(NEW.state, '') || ' ' || coalesce(NEW.postcode, '')), 'C');
    NEW.updated_at := now();
    RETURN NEW;
END
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS businesses_search_tokens_trg ON businesses;
CREATE TRIGGER businesses_search_tokens_trg
    BEFORE INSERT OR UPDATE ON businesses
    FOR EACH ROW
    EXECUTE FUNCTION businesses_refresh_search_tokens();

-- One-shot backfill for rows written before the trigger existed; the
-- self-assignment routes them through the trigger above.
UPDATE businesses SET entity_name = entity_name WHERE search_tokens IS NULL;
"#;

/// Apply the schema. Safe to run on every startup.
pub async fn migrate(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::raw_sql(SCHEMA).execute(pool).await?;
    Ok(())
}
