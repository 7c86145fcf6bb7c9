use crate::services::acquisition::AcquisitionService;

pub struct AppState<P> {
    pub acquisition: AcquisitionService<P>,
}
