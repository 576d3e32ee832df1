pub mod aggregate;

pub use aggregate::StatisticsAggregate;
