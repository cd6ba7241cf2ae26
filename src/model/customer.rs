use serde::{Deserialize, Serialize};

/// Customer record returned by the database service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerRecord {
    pub order_id: String,
    pub customer_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl CustomerRecord {
    pub fn new(order_id: impl Into<String>, customer_name: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            customer_name: customer_name.into(),
            email: None,
            phone: None,
        }
    }
}
