//! Application layer - the monitoring controller and the chat front-end

pub mod bot;
pub mod monitor;
