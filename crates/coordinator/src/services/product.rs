//! Product catalog and stock service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{MerchantId, OrderNo, ProductId};
use domain::Money;

use super::{read, write};
use crate::error::CoordinatorError;

/// Catalog data copied onto an order line at purchase time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub merchant_id: Option<MerchantId>,
    pub name: String,
    pub image: Option<String>,
    pub price: Money,
}

impl ProductSnapshot {
    pub fn new(product_id: ProductId, name: impl Into<String>, price: Money) -> Self {
        Self {
            product_id,
            merchant_id: None,
            name: name.into(),
            image: None,
            price,
        }
    }

    pub fn with_merchant(mut self, merchant_id: MerchantId) -> Self {
        self.merchant_id = Some(merchant_id);
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }
}

/// Trait for catalog lookups and stock adjustments.
///
/// `deduct_stock` and `restore_stock` return `Ok(false)` when the service
/// understood the request but refused it.
#[async_trait]
pub trait ProductService: Send + Sync {
    /// Returns snapshots for the ids that exist; unknown ids are omitted.
    async fn get_products_batch(
        &self,
        ids: &[ProductId],
    ) -> Result<Vec<ProductSnapshot>, CoordinatorError>;

    async fn check_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<bool, CoordinatorError>;

    async fn deduct_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
        order_no: &OrderNo,
    ) -> Result<bool, CoordinatorError>;

    async fn restore_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
        order_no: &OrderNo,
    ) -> Result<bool, CoordinatorError>;
}

/// A recorded deduct or restore call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: ProductId,
    pub quantity: u32,
    pub order_no: OrderNo,
}

#[derive(Debug, Default)]
struct InMemoryProductState {
    products: HashMap<ProductId, ProductSnapshot>,
    stock: HashMap<ProductId, u32>,
    deductions: Vec<StockMovement>,
    restorations: Vec<StockMovement>,
    fail_on_batch: bool,
    fail_on_deduct: Option<ProductId>,
    fail_on_restore: bool,
}

/// In-memory product service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProductService {
    state: Arc<RwLock<InMemoryProductState>>,
}

impl InMemoryProductService {
    /// Creates a new in-memory product service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a product with an initial stock level.
    pub fn add_product(&self, snapshot: ProductSnapshot, stock: u32) {
        let mut state = write(&self.state);
        state.stock.insert(snapshot.product_id, stock);
        state.products.insert(snapshot.product_id, snapshot);
    }

    /// Changes the catalog price of an existing product.
    pub fn set_price(&self, product_id: ProductId, price: Money) {
        if let Some(product) = write(&self.state).products.get_mut(&product_id) {
            product.price = price;
        }
    }

    pub fn set_fail_on_batch(&self, fail: bool) {
        write(&self.state).fail_on_batch = fail;
    }

    /// Makes deductions for `product_id` fail; `None` clears the switch.
    pub fn set_fail_on_deduct(&self, product_id: Option<ProductId>) {
        write(&self.state).fail_on_deduct = product_id;
    }

    pub fn set_fail_on_restore(&self, fail: bool) {
        write(&self.state).fail_on_restore = fail;
    }

    /// Returns the current stock of a product.
    pub fn stock_of(&self, product_id: ProductId) -> u32 {
        read(&self.state)
            .stock
            .get(&product_id)
            .copied()
            .unwrap_or_default()
    }

    pub fn deductions(&self) -> Vec<StockMovement> {
        read(&self.state).deductions.clone()
    }

    pub fn restorations(&self) -> Vec<StockMovement> {
        read(&self.state).restorations.clone()
    }

    /// Number of successful restore calls for an order.
    pub fn restore_count(&self, order_no: &OrderNo) -> usize {
        read(&self.state)
            .restorations
            .iter()
            .filter(|m| &m.order_no == order_no)
            .count()
    }

    /// Number of successful deduct calls for an order.
    pub fn deduct_count(&self, order_no: &OrderNo) -> usize {
        read(&self.state)
            .deductions
            .iter()
            .filter(|m| &m.order_no == order_no)
            .count()
    }
}

#[async_trait]
impl ProductService for InMemoryProductService {
    async fn get_products_batch(
        &self,
        ids: &[ProductId],
    ) -> Result<Vec<ProductSnapshot>, CoordinatorError> {
        let state = read(&self.state);

        if state.fail_on_batch {
            return Err(CoordinatorError::ProductService(
                "Catalog unavailable".to_string(),
            ));
        }

        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id))
            .cloned()
            .collect())
    }

    async fn check_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
    ) -> Result<bool, CoordinatorError> {
        let state = read(&self.state);
        Ok(state
            .stock
            .get(&product_id)
            .is_some_and(|available| *available >= quantity))
    }

    async fn deduct_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
        order_no: &OrderNo,
    ) -> Result<bool, CoordinatorError> {
        let mut state = write(&self.state);

        if state.fail_on_deduct == Some(product_id) {
            return Err(CoordinatorError::ProductService(format!(
                "Deduction rejected for {product_id}"
            )));
        }

        let Some(available) = state.stock.get_mut(&product_id) else {
            return Ok(false);
        };
        if *available < quantity {
            return Ok(false);
        }
        *available -= quantity;

        state.deductions.push(StockMovement {
            product_id,
            quantity,
            order_no: order_no.clone(),
        });
        Ok(true)
    }

    async fn restore_stock(
        &self,
        product_id: ProductId,
        quantity: u32,
        order_no: &OrderNo,
    ) -> Result<bool, CoordinatorError> {
        let mut state = write(&self.state);

        if state.fail_on_restore {
            return Err(CoordinatorError::ProductService(
                "Stock service unavailable".to_string(),
            ));
        }

        *state.stock.entry(product_id).or_default() += quantity;
        state.restorations.push(StockMovement {
            product_id,
            quantity,
            order_no: order_no.clone(),
        });
        Ok(true)
    }
}
