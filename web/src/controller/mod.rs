pub(crate) mod compute_controller;
pub(crate) mod health_check_controller;
