mod money;

pub mod op;

pub use money::{Money, MoneyConversionError, CENTS_PER_UNIT};
