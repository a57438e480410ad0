//! Read model views for the query side.

pub mod order_board;

pub use order_board::{
    BuyingStats, OrderBoardView, OrderFilter, OrderSummary, SellingStats, TradeStats,
};
