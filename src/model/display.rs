use serde::{Deserialize, Serialize};

/// Customer banner shown on the display screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerInfo {
    pub order_id: String,
    pub customer_name: String,
    pub estimated_time: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Opened,
    Failed,
}

/// One serving unit as shown on the display screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServingUnitInfo {
    pub unit_id: String,
    pub item_name: String,
    pub status: UnitStatus,
}
