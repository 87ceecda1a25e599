pub mod health;
pub mod kv;
pub mod ts;
