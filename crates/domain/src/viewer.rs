use common::UserId;

/// Who is reading an order or payment.
///
/// Customers only see their own records. Anything else reads as not found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Viewer {
    Customer(UserId),
    Admin,
}

impl Viewer {
    pub fn can_see(&self, owner: UserId) -> bool {
        match self {
            Viewer::Customer(user_id) => *user_id == owner,
            Viewer::Admin => true,
        }
    }
}
