use common::{OrderStatus, UserId};
use serde::Serialize;

/// Page number and size for list queries. Pages are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub const DEFAULT_LIMIT: u32 = 10;
    pub const MAX_LIMIT: u32 = 100;

    /// Creates a page request, clamping to `page >= 1` and `1 <= limit <= MAX_LIMIT`.
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: page.max(1),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    /// Number of rows to skip.
    pub fn offset(&self) -> usize {
        (self.page as usize - 1) * self.limit as usize
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

/// One page of results plus the total row count.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

impl<T> Page<T> {
    /// Builds a page by slicing an already-sorted list.
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as u64;
        let items = all
            .into_iter()
            .skip(request.offset())
            .take(request.limit as usize)
            .collect();
        Self {
            items,
            total,
            page: request.page,
            limit: request.limit,
        }
    }
}

/// Builder for order list queries. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Filter by owning user.
    pub user_id: Option<UserId>,

    /// Filter by status.
    pub status: Option<OrderStatus>,

    pub page: PageRequest,
}

impl OrderQuery {
    /// Creates a new query over all orders.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for one user's orders.
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    /// Filters by status.
    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Sets the page.
    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }
}
