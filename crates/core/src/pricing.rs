use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Per-country discount applied to the base and upsell list prices.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountryDiscount {
    #[serde(default)]
    pub base: Decimal,
    #[serde(default)]
    pub upsell: Decimal,
}

/// Resolved amount for one product, kept alongside the inputs so operator
/// notifications can show how the number came to be.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub currency: String,
    pub list_price: Decimal,
    pub discount: Decimal,
    pub final_price: Decimal,
    pub discounted: bool,
}

/// Injected read-only price table. Handlers receive a shared reference at
/// construction; nothing in the funnel mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceBook {
    pub currency: String,
    pub base_price: Decimal,
    pub upsell_price: Decimal,
    #[serde(default)]
    pub discounts: BTreeMap<String, CountryDiscount>,
}

impl PriceBook {
    pub fn base_quote(&self, country: Option<&str>) -> PriceQuote {
        self.quote(self.base_price, country, |d| d.base)
    }

    pub fn upsell_quote(&self, country: Option<&str>) -> PriceQuote {
        self.quote(self.upsell_price, country, |d| d.upsell)
    }

    fn quote(
        &self,
        list_price: Decimal,
        country: Option<&str>,
        pick: impl Fn(&CountryDiscount) -> Decimal,
    ) -> PriceQuote {
        let discount = country
            .and_then(|name| self.discount_for(name))
            .map(|entry| pick(entry))
            .unwrap_or(Decimal::ZERO);
        let discount = discount.min(list_price).max(Decimal::ZERO);
        PriceQuote {
            currency: self.currency.clone(),
            list_price,
            discount,
            final_price: list_price - discount,
            discounted: !discount.is_zero(),
        }
    }

    fn discount_for(&self, country: &str) -> Option<&CountryDiscount> {
        let wanted = country.trim().to_lowercase();
        self.discounts.iter().find(|(name, _)| name.to_lowercase() == wanted).map(|(_, d)| d)
    }
}

impl Default for PriceBook {
    fn default() -> Self {
        let mut discounts = BTreeMap::new();
        discounts.insert(
            "Ecuador".to_string(),
            CountryDiscount { base: Decimal::new(100, 2), upsell: Decimal::new(200, 2) },
        );
        PriceBook {
            currency: "USD".to_string(),
            base_price: Decimal::new(799, 2),
            upsell_price: Decimal::new(1499, 2),
            discounts,
        }
    }
}
