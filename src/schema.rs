use crate::error::{EdaError, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Exact column names of the forecast export. Matching is byte-for-byte and case-sensitive.
pub mod columns {
    pub const PLANNING_MONTH: &str = "Time.[Planning Month]";
    pub const EVERGREEN: &str = "Evergreen.[Evergreen]";
    pub const SALES_UNITS: &str = "Sales (Units)";
    pub const ACTUAL_AUR: &str = "Actual AUR";
    pub const SALES_REVENUE: &str = "Sales (Revenue)";
    pub const BRAND: &str = "Global Plan Brand.[Global Plan Brand]";
    pub const REGION: &str = "Region.[Region]";
    pub const CHANNEL: &str = "Channel.[Channel]";
    pub const COUNTRY: &str = "Country.[Country]";
    pub const ITEM: &str = "Item.[PPL]";
    pub const PLAN_L1: &str = "Global Plan L1.[Global Plan L1]";
    pub const PLAN_L2: &str = "Global Plan L2.[Global Plan L2]";
    pub const PLAN_L3: &str = "Global Plan L3.[Global Plan L3]";
    pub const PLAN_L4: &str = "Global Plan L4.[Global Plan L4]";

    /// Name under which the derived calendar date is exposed.
    pub const DATE: &str = "Date";

    /// Dimensions reported by the cardinality summary, in report order.
    pub const KEY_DIMENSIONS: [&str; 9] = [
        BRAND, REGION, CHANNEL, PLAN_L1, PLAN_L2, PLAN_L3, PLAN_L4, ITEM, EVERGREEN,
    ];
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum SemanticType {
    Numeric,
    Text,
    Date,
    Boolean,
}

/// A categorical axis an aggregation can group by.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "PascalCase")]
pub enum Dimension {
    /// Calendar month of the derived date.
    Month,
    Brand,
    Region,
    Channel,
    Country,
    PlanL1,
    Item,
}

impl Dimension {
    /// Source column backing this dimension. `None` for [`Dimension::Month`], which
    /// reads the derived date instead.
    pub fn column(&self) -> Option<&'static str> {
        match self {
            Dimension::Month => None,
            Dimension::Brand => Some(columns::BRAND),
            Dimension::Region => Some(columns::REGION),
            Dimension::Channel => Some(columns::CHANNEL),
            Dimension::Country => Some(columns::COUNTRY),
            Dimension::PlanL1 => Some(columns::PLAN_L1),
            Dimension::Item => Some(columns::ITEM),
        }
    }

    pub fn label(&self) -> &'static str {
        self.column().unwrap_or(columns::DATE)
    }
}

fn default_zero_sales_top_n() -> usize {
    5
}

fn default_focus_year() -> i32 {
    2024
}

fn default_channel_allow_list() -> Vec<String> {
    ["Wholesale", "Retail", "Digital", "Outlet"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_measure() -> String {
    columns::SALES_UNITS.to_string()
}

/// Knobs for the standard views produced by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, JsonSchema)]
pub struct EdaConfig {
    #[schemars(description = "How many items to report in the zero-sales ranking.")]
    #[serde(default = "default_zero_sales_top_n")]
    pub zero_sales_top_n: usize,

    #[schemars(description = "Calendar year used by the year-filtered country view.")]
    #[serde(default = "default_focus_year")]
    pub focus_year: i32,

    #[schemars(description = "Channel values kept by the channel allow-list view.")]
    #[serde(default = "default_channel_allow_list")]
    pub channel_allow_list: Vec<String>,

    #[schemars(description = "Numeric column summed by the aggregation views.")]
    #[serde(default = "default_measure")]
    pub measure: String,
}

impl Default for EdaConfig {
    fn default() -> Self {
        Self {
            zero_sales_top_n: default_zero_sales_top_n(),
            focus_year: default_focus_year(),
            channel_allow_list: default_channel_allow_list(),
            measure: default_measure(),
        }
    }
}

impl EdaConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EdaConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.zero_sales_top_n == 0 {
            return Err(EdaError::InvalidConfig(
                "zero_sales_top_n must be at least 1".to_string(),
            ));
        }
        if self.channel_allow_list.is_empty() {
            return Err(EdaError::InvalidConfig(
                "channel_allow_list must name at least one channel".to_string(),
            ));
        }
        if self.measure.trim().is_empty() {
            return Err(EdaError::InvalidConfig(
                "measure column name is empty".to_string(),
            ));
        }
        Ok(())
    }
}
