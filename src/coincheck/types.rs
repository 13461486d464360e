//! Coincheck API request and response types
//!
//! Amounts and rates arrive either as JSON numbers or as strings depending on
//! the endpoint; `Decimal` accepts both.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{BookLevel, OrderBookSnapshot, PriceTick, Side, TickerSnapshot};

/// `GET /api/ticker`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Ticker {
    pub last: Decimal,
    pub bid: Decimal,
    pub ask: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub volume: Decimal,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub timestamp: DateTime<Utc>,
}

impl From<Ticker> for TickerSnapshot {
    fn from(t: Ticker) -> Self {
        TickerSnapshot {
            last: t.last,
            bid: t.bid,
            ask: t.ask,
            high: t.high,
            low: t.low,
            volume: t.volume,
            timestamp: t.timestamp,
        }
    }
}

/// `GET /api/trades` envelope
#[derive(Debug, Clone, Deserialize)]
pub struct PublicTrades {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub data: Vec<PublicTrade>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PublicTrade {
    pub id: u64,
    pub amount: Decimal,
    pub rate: Decimal,
    pub pair: String,
    pub order_type: OrderSide,
    pub created_at: DateTime<Utc>,
}

impl From<PublicTrade> for PriceTick {
    fn from(t: PublicTrade) -> Self {
        PriceTick {
            id: t.id,
            pair: t.pair,
            rate: t.rate,
            amount: t.amount,
            side: t.order_type.into(),
            timestamp: t.created_at,
        }
    }
}

/// `GET /api/order_books`: levels are `[price, quantity]` string pairs
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    pub asks: Vec<(Decimal, Decimal)>,
    pub bids: Vec<(Decimal, Decimal)>,
}

impl OrderBook {
    pub fn into_snapshot(self, captured_at: DateTime<Utc>) -> OrderBookSnapshot {
        let levels = |v: Vec<(Decimal, Decimal)>| {
            v.into_iter()
                .map(|(price, quantity)| BookLevel { price, quantity })
                .collect()
        };
        OrderBookSnapshot {
            asks: levels(self.asks),
            bids: levels(self.bids),
            captured_at,
        }
    }
}

/// `GET /api/accounts/balance`: one entry per currency field
#[derive(Debug, Clone, Deserialize)]
pub struct Balance {
    #[serde(default)]
    pub success: bool,
    #[serde(flatten)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl Balance {
    /// Available amount for a currency code (`jpy`, `btc`, ...)
    pub fn available(&self, currency: &str) -> Option<Decimal> {
        match self.fields.get(currency)? {
            serde_json::Value::String(s) => s.parse().ok(),
            serde_json::Value::Number(n) => n.to_string().parse().ok(),
            _ => None,
        }
    }
}

/// Order side as the exchange spells it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderSide {
    Buy,
    Sell,
    MarketBuy,
    MarketSell,
}

impl From<OrderSide> for Side {
    fn from(s: OrderSide) -> Self {
        match s {
            OrderSide::Buy | OrderSide::MarketBuy => Side::Buy,
            OrderSide::Sell | OrderSide::MarketSell => Side::Sell,
        }
    }
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::MarketBuy => "market_buy",
            Self::MarketSell => "market_sell",
        }
    }
}

/// Parameters for `POST /api/exchange/orders`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOrder {
    pub pair: String,
    pub order_type: OrderSide,
    pub rate: Option<Decimal>,
    pub amount: Option<Decimal>,
    pub market_buy_amount: Option<Decimal>,
    pub stop_loss_rate: Option<Decimal>,
}

impl NewOrder {
    pub fn limit(side: Side, pair: &str, rate: Decimal, amount: Decimal) -> Self {
        Self {
            pair: pair.to_string(),
            order_type: match side {
                Side::Buy => OrderSide::Buy,
                Side::Sell => OrderSide::Sell,
            },
            rate: Some(rate),
            amount: Some(amount),
            market_buy_amount: None,
            stop_loss_rate: None,
        }
    }

    /// Query parameters; unset optional fields are omitted.
    pub fn to_query(&self) -> BTreeMap<String, String> {
        let mut query = BTreeMap::new();
        query.insert("pair".to_string(), self.pair.clone());
        query.insert("order_type".to_string(), self.order_type.as_str().to_string());
        let optional = [
            ("rate", self.rate),
            ("amount", self.amount),
            ("market_buy_amount", self.market_buy_amount),
            ("stop_loss_rate", self.stop_loss_rate),
        ];
        for (key, value) in optional {
            if let Some(v) = value {
                query.insert(key.to_string(), v.to_string());
            }
        }
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_ticker_parse() {
        let json = r#"{"last":27390,"bid":26900,"ask":27390,"high":27659,"low":26400,
                       "volume":"50.29627103","timestamp":1423377841}"#;
        let ticker: Ticker = serde_json::from_str(json).unwrap();
        assert_eq!(ticker.last, dec!(27390));
        assert_eq!(ticker.volume, dec!(50.29627103));
        assert_eq!(ticker.timestamp.timestamp(), 1423377841);
    }

    #[test]
    fn test_trades_parse() {
        let json = r#"{"success":true,"pagination":{"limit":1,"order":"desc"},
            "data":[{"id":82,"amount":"0.28391","rate":"35400.0","pair":"btc_jpy",
                     "order_type":"sell","created_at":"2015-01-10T05:55:38.000Z"}]}"#;
        let trades: PublicTrades = serde_json::from_str(json).unwrap();
        assert!(trades.success);
        let tick: PriceTick = trades.data[0].clone().into();
        assert_eq!(tick.id, 82);
        assert_eq!(tick.rate, dec!(35400.0));
        assert_eq!(tick.side, Side::Sell);
    }

    #[test]
    fn test_order_book_parse() {
        let json = r#"{"asks":[["27330.0","2.25"],["27340.0","0.45"]],
                       "bids":[["27240.0","1.1543"]]}"#;
        let book: OrderBook = serde_json::from_str(json).unwrap();
        let snapshot = book.into_snapshot(Utc::now());
        assert_eq!(snapshot.asks.len(), 2);
        assert_eq!(snapshot.bids[0].price, dec!(27240.0));
        assert_eq!(snapshot.bids[0].quantity, dec!(1.1543));
    }

    #[test]
    fn test_balance_available() {
        let json = r#"{"success":true,"jpy":"0.8401","btc":"7.75052654","jpy_reserved":3000}"#;
        let balance: Balance = serde_json::from_str(json).unwrap();
        assert_eq!(balance.available("jpy"), Some(dec!(0.8401)));
        assert_eq!(balance.available("jpy_reserved"), Some(dec!(3000)));
        assert_eq!(balance.available("eth"), None);
    }

    #[test]
    fn test_new_order_query() {
        let order = NewOrder::limit(Side::Buy, "btc_jpy", dec!(6328998.0), dec!(0.05));
        let query = order.to_query();
        let keys: Vec<_> = query.keys().cloned().collect();
        assert_eq!(keys, vec!["amount", "order_type", "pair", "rate"]);
        assert_eq!(query["order_type"], "buy");
        assert_eq!(query["rate"], "6328998.0");
    }
}
