pub mod approval;
pub mod audit;
pub mod categories;
pub mod columns;
pub mod completion;
pub mod core;
pub mod deadlines;
pub mod entries;
pub mod excel;
pub mod hierarchy;
pub mod notifications;
pub mod reports;
pub mod session;
pub mod users;
