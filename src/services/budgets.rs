use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    db::{DbPool, DbResult},
    models::{Budget, BudgetResetLog, CreateBudget},
};

/// Service layer for budget administration
#[derive(Clone)]
pub struct BudgetService {
    db: Arc<DbPool>,
}

impl BudgetService {
    pub fn new(db: Arc<DbPool>) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: CreateBudget) -> DbResult<Budget> {
        let budget = self.db.budgets().create(input, Utc::now()).await?;
        tracing::info!(
            budget_id = %budget.id,
            scope = budget.scope.scope_type(),
            scope_id = %budget.scope.scope_id(),
            limit = budget.limit,
            period = %budget.period,
            "Budget created"
        );
        Ok(budget)
    }

    pub async fn get(&self, id: Uuid) -> DbResult<Option<Budget>> {
        self.db.budgets().get_by_id(id).await
    }

    pub async fn list_in_scope(
        &self,
        user_id: &str,
        api_key_id: Option<Uuid>,
    ) -> DbResult<Vec<Budget>> {
        self.db.budgets().list_in_scope(user_id, api_key_id).await
    }

    pub async fn set_active(&self, id: Uuid, is_active: bool) -> DbResult<bool> {
        self.db.budgets().set_active(id, is_active).await
    }

    pub async fn list_reset_logs(&self, budget_id: Uuid) -> DbResult<Vec<BudgetResetLog>> {
        self.db.budgets().list_reset_logs(budget_id).await
    }
}
