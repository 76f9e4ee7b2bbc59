use mongodb::{Client, Database};

pub async fn connect(database_url: &str, database_name: &str) -> Database {
    let client = Client::with_uri_str(database_url)
        .await
        .expect("Failed to connect to MongoDB");

    let db = client.database(database_name);

    match db.list_collection_names().await {
        Ok(collections) => {
            tracing::info!("✅ Connected to database: {}", database_name);
            if !collections.contains(&"payments".to_string()) {
                tracing::warn!("'payments' collection not found, it will be created on first insert");
            }
        }
        Err(e) => {
            tracing::error!(
                "Database '{}' may not exist or is inaccessible: {}",
                database_name,
                e
            );
        }
    }

    db
}
