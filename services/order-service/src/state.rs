use read_model::ReadGateway;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: ReadGateway,
}

impl AppState {
    pub fn new(gateway: ReadGateway) -> Self {
        Self { gateway }
    }
}
