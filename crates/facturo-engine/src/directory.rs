//! # Party Directory
//!
//! [`PartyDirectory`] backed by the `merchants` and `customers` tables.

use async_trait::async_trait;

use facturo_core::{Customer, Merchant};
use facturo_db::repository::party;
use facturo_db::Database;

use crate::error::EngineResult;
use crate::ports::PartyDirectory;

/// Reads parties from the local database.
#[derive(Debug, Clone)]
pub struct DbPartyDirectory {
    db: Database,
}

impl DbPartyDirectory {
    pub fn new(db: Database) -> Self {
        DbPartyDirectory { db }
    }
}

#[async_trait]
impl PartyDirectory for DbPartyDirectory {
    async fn merchant(&self, id: &str) -> EngineResult<Option<Merchant>> {
        Ok(party::merchant(self.db.pool(), id).await?)
    }

    async fn customer(&self, merchant_id: &str, id: &str) -> EngineResult<Option<Customer>> {
        Ok(party::customer(self.db.pool(), merchant_id, id).await?)
    }
}
