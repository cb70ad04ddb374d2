use async_trait::async_trait;
use futures::TryStreamExt;
use bson::{Document, Bson, Uuid, doc};
use mongodb::{
    Client, Collection as MongoCollection,
    options::ClientOptions,
};
use tracing::{debug, info};
use denorm_core::{
    backend::{StoreBackend, StoreBackendBuilder},
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, QueryVisitor},
    update::{Update, UpdateResult},
};

use crate::{sanitizer::KeySanitizer, query::{MongoQueryTranslator, translate_update}};


/// MongoDB backend. Records are stored with their id duplicated into `_id`.
#[derive(Debug)]
pub struct MongoDbStore {
    client: Client,
    database: String,
}

impl MongoDbStore {
    pub fn new(client: Client, database: String) -> Self {
        Self { client, database }
    }

    pub fn builder(dsn: &str, database: &str) -> MongoDbStoreBuilder {
        MongoDbStoreBuilder::new(dsn, database)
    }

    fn get_collection(&self, collection_name: &str) -> MongoCollection<Document> {
        self.client
            .database(&self.database)
            .collection(&KeySanitizer::sanitize_string(collection_name))
    }

    fn prepare_document(&self, id: &Uuid, document: &Bson) -> DocumentStoreResult<Document> {
        let mut prepared = match document {
            Bson::Document(fields) => KeySanitizer::sanitize_document(fields),
            other => {
                return Err(DocumentStoreError::InvalidDocument(format!(
                    "expected a document, found {:?}",
                    other.element_type()
                )));
            }
        };

        prepared.insert("_id", *id);

        Ok(prepared)
    }

    fn restore_document(&self, mut document: Document) -> Bson {
        document.remove("_id");

        Bson::Document(KeySanitizer::restore_document(&document))
    }

    async fn collect(&self, collection: &str, filter: Document) -> DocumentStoreResult<Vec<Bson>> {
        Ok(
            self.get_collection(collection)
                .find(filter)
                .await
                .map_err(backend_error)?
                .try_collect::<Vec<Document>>()
                .await
                .map_err(backend_error)?
                .into_iter()
                .map(|doc| self.restore_document(doc))
                .collect()
        )
    }
}

fn backend_error(e: mongodb::error::Error) -> DocumentStoreError {
    DocumentStoreError::Backend(e.to_string())
}

#[async_trait]
impl StoreBackend for MongoDbStore {
    async fn insert_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        if documents.is_empty() {
            return Ok(());
        }

        self.get_collection(collection)
            .insert_many(
                documents
                    .iter()
                    .map(|(id, doc)| self.prepare_document(id, doc))
                    .collect::<DocumentStoreResult<Vec<Document>>>()?,
            )
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn upsert_documents(&self, documents: Vec<(Uuid, Bson)>, collection: &str) -> DocumentStoreResult<()> {
        let target = self.get_collection(collection);

        for (id, doc) in documents {
            target
                .replace_one(doc! { "_id": id }, self.prepare_document(&id, &doc)?)
                .upsert(true)
                .await
                .map_err(backend_error)?;
        }

        Ok(())
    }

    async fn delete_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<()> {
        self.get_collection(collection)
            .delete_many(doc! { "_id": { "$in": ids } })
            .await
            .map_err(backend_error)?;

        Ok(())
    }

    async fn get_documents(&self, ids: Vec<Uuid>, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        self.collect(collection, doc! { "_id": { "$in": ids } }).await
    }

    async fn find_documents(&self, filter: &Expr, collection: &str) -> DocumentStoreResult<Vec<Bson>> {
        self.collect(collection, MongoQueryTranslator.visit_expr(filter)?).await
    }

    async fn update_many(&self, filter: &Expr, update: &Update, collection: &str) -> DocumentStoreResult<UpdateResult> {
        if update.is_empty() {
            return Ok(UpdateResult::default());
        }

        let filter = MongoQueryTranslator.visit_expr(filter)?;
        let update = translate_update(update);

        debug!(collection, filter = %filter, update = %update, "update_many");

        let result = self
            .get_collection(collection)
            .update_many(filter, update)
            .await
            .map_err(backend_error)?;

        Ok(UpdateResult {
            matched: result.matched_count,
            modified: result.modified_count,
        })
    }

    async fn shutdown(&self) -> DocumentStoreResult<()> {
        self.client.clone().shutdown().await;

        info!(database = %self.database, "mongodb client shut down");

        Ok(())
    }
}

pub struct MongoDbStoreBuilder {
    dsn: String,
    database: String,
}

impl MongoDbStoreBuilder {
    pub fn new(dsn: &str, database: &str) -> Self {
        Self {
            dsn: dsn.to_string(),
            database: database.to_string(),
        }
    }
}

#[async_trait]
impl StoreBackendBuilder for MongoDbStoreBuilder {
    type Backend = MongoDbStore;

    async fn build(self) -> DocumentStoreResult<Self::Backend> {
        Ok(MongoDbStore::new(
            Client::with_options(
                ClientOptions::parse(&self.dsn)
                    .await
                    .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            )
            .map_err(|e| DocumentStoreError::Initialization(e.to_string()))?,
            self.database,
        ))
    }
}
