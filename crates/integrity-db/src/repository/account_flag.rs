//! SurrealDB implementation of [`AccountFlagRepository`].

use integrity_core::error::IntegrityResult;
use integrity_core::models::restriction::AccountFlags;
use integrity_core::repository::AccountFlagRepository;
use surrealdb::{Connection, Surreal};

use crate::error::DbError;

/// Stores derived account flags keyed by customer id.
#[derive(Clone)]
pub struct SurrealAccountFlagRepository<C: Connection> {
    db: Surreal<C>,
}

impl<C: Connection> SurrealAccountFlagRepository<C> {
    pub fn new(db: Surreal<C>) -> Self {
        Self { db }
    }
}

impl<C: Connection> AccountFlagRepository for SurrealAccountFlagRepository<C> {
    async fn set_flags(&self, customer_id: &str, flags: AccountFlags) -> IntegrityResult<()> {
        let result = self
            .db
            .query(
                "UPSERT type::record('account_flag', $customer_id) SET \
                 customer_id = $customer_id, \
                 credit_hold = $credit_hold, \
                 updated_at = time::now()",
            )
            .bind(("customer_id", customer_id.to_string()))
            .bind(("credit_hold", flags.credit_hold))
            .await
            .map_err(DbError::from)?;

        result
            .check()
            .map_err(|e| DbError::from_statement("account_flag", e))?;
        Ok(())
    }
}
