use crate::providers::ProviderImpl;
use crate::settings;

pub(crate) struct ServerState {
    pub(crate) settings: settings::Settings,
    pub(crate) provider: ProviderImpl,
    pub(crate) index_html: String,
}
