pub mod entries;
pub mod pairs;
pub mod users;
