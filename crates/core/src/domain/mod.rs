pub mod normalize;
pub mod tariff;
