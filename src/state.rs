use crate::{encoder::Backend, supervisor::Supervisor};

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Supervisor,
    pub default_backend: Backend,
}
