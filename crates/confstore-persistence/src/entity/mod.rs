//! SeaORM entity definitions

pub mod config_data;

pub mod prelude {
    pub use super::config_data::Entity as ConfigData;
}
