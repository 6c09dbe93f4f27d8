//! Флот автономних агентів, що шукають скарби на частково видимій сітці.
//!
//! Контролер веде кожного агента через рядковий транспорт і окрему
//! площину керування (призупинення, відновлення, зарядка, знімок стану).
pub mod agent;
pub mod battery;
pub mod controller;
pub mod core;
pub mod environment;
pub mod knowledge;
pub mod protocol;
pub mod settings;
pub mod shell;
pub mod transport;
