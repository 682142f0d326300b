use std::env;

use anyhow::{anyhow, bail, Context, Result};
use diesel::prelude::*;
use serde_json::json;
use uuid::Uuid;

use assetvault::{
    activity::{self, EVENT_FORCE_DELETED, SUBJECT_ASSET},
    auth::password,
    config::AppConfig,
    db,
    models::{Asset, NewUser},
    policy::normalize_role_names,
    schema::{assets, users},
    storage::{ObjectStorage, S3Storage},
};

const USAGE: &str = "Usage:\n  maintenance create-user <email> <name> <password> <roles>\n  maintenance purge-deleted-assets";

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    let args: Vec<String> = env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("create-user") => create_user(&args[1..])?,
        Some("purge-deleted-assets") => purge_deleted_assets().await?,
        Some(cmd) => {
            eprintln!("Unknown command: {cmd}\n{USAGE}");
            std::process::exit(1);
        }
        None => {
            eprintln!("{USAGE}");
            std::process::exit(1);
        }
    }

    Ok(())
}

fn parse_roles(raw: &str) -> Result<Vec<String>> {
    normalize_role_names(raw.split(',')).map_err(|err| anyhow!(err))
}

fn create_user(args: &[String]) -> Result<()> {
    let [email, name, plain_password, roles] = args else {
        bail!("create-user expects 4 arguments\n{USAGE}");
    };

    let config = AppConfig::from_env()?;
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    db::run_migrations(&pool)?;
    let mut conn = pool.get().context("failed to get database connection")?;

    let new_user = NewUser {
        id: Uuid::new_v4(),
        email: email.trim().to_lowercase(),
        name: name.trim().to_string(),
        password_hash: password::hash_password(plain_password)?,
        roles: parse_roles(roles)?,
        is_enabled: true,
    };

    diesel::insert_into(users::table)
        .values(&new_user)
        .execute(&mut conn)
        .context("failed to insert user")?;

    println!(
        "Created user {} ({}) with roles {}",
        new_user.email,
        new_user.id,
        new_user.roles.join(",")
    );
    Ok(())
}

/// Physically removes soft-deleted assets; their blobs were removed at delete time.
async fn purge_deleted_assets() -> Result<()> {
    let config = AppConfig::from_env()?;
    tracing::info!(
        component = "maintenance",
        database_url = %config.redacted_database_url(),
        s3_bucket = %config.s3_bucket,
        "loaded configuration"
    );
    let pool = db::init_pool_with_size(&config.database_url, 1)?;
    let storage = S3Storage::from_config(&config).await?;

    let mut conn = pool.get().context("failed to get database connection")?;
    let deleted: Vec<Asset> = assets::table
        .filter(assets::deleted_at.is_not_null())
        .load(&mut conn)
        .context("failed to load soft-deleted assets")?;

    if deleted.is_empty() {
        println!("No soft-deleted assets found.");
        return Ok(());
    }

    println!("Purging {} assets…", deleted.len());

    let mut purged = 0usize;
    for asset in &deleted {
        if let Err(err) = storage.delete_object(&asset.file_path).await {
            eprintln!("Skipping {}: failed to delete object {}: {err}", asset.id, asset.file_path);
            continue;
        }

        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(assets::table.find(asset.id)).execute(conn)?;
            activity::record(
                conn,
                SUBJECT_ASSET,
                asset.id,
                None,
                EVENT_FORCE_DELETED,
                json!({ "old": activity::asset_properties(asset), "purged": true }),
            )
        })
        .with_context(|| format!("failed to remove asset record {}", asset.id))?;
        purged += 1;
    }

    println!("Purged {purged} asset records.");
    Ok(())
}
