//! OpenAPI documentation configuration.

use sqpatch_types::api::{
    AddChannelRequest, AvailableIdsResponse, ChannelResponse, ErrorResponse, GainRequest,
    ImportResponse, LoadShowResponse, PreampGainResponse, PreampToggleResponse,
    ReplaceStateRequest, SaveShowRequest, SaveShowResponse, SettingsResponse, ShowListResponse,
    ShowResponse, StateResponse, SyncStartedResponse, UpdateChannelRequest,
    UpdateSettingsRequest,
};
use sqpatch_types::{
    Channel, PreampBus, PreampLayout, ShowChannel, ShowFile, SyncResult, SyncState,
    SyncStatusResponse,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::state::get_state,
        crate::api::state::replace_state,
        crate::api::state::reset_state,
        crate::api::state::import_state,
        crate::api::state::export_state,
        crate::api::settings::get_settings,
        crate::api::settings::update_settings,
        crate::api::channels::add_channel,
        crate::api::channels::update_channel,
        crate::api::channels::delete_channel,
        crate::api::channels::available_ids,
        crate::api::channels::set_phantom,
        crate::api::channels::set_pad,
        crate::api::channels::set_gain,
        crate::api::shows::list_shows,
        crate::api::shows::save_show,
        crate::api::shows::get_show,
        crate::api::shows::delete_show,
        crate::api::shows::load_show,
        crate::api::sync::start_sync,
        crate::api::sync::sync_status,
        crate::api::preamp::set_phantom,
        crate::api::preamp::set_pad,
        crate::api::preamp::set_gain,
        crate::api::sse::events_stream,
    ),
    components(
        schemas(
            Channel,
            PreampBus,
            PreampLayout,
            ShowChannel,
            ShowFile,
            StateResponse,
            ReplaceStateRequest,
            ImportResponse,
            SettingsResponse,
            UpdateSettingsRequest,
            AddChannelRequest,
            UpdateChannelRequest,
            ChannelResponse,
            AvailableIdsResponse,
            GainRequest,
            PreampToggleResponse,
            PreampGainResponse,
            ShowListResponse,
            SaveShowRequest,
            SaveShowResponse,
            LoadShowResponse,
            ShowResponse,
            SyncStartedResponse,
            SyncStatusResponse,
            SyncState,
            SyncResult,
            ErrorResponse,
        )
    ),
    tags(
        (name = "state", description = "Full channel list, import and export"),
        (name = "settings", description = "Mixer address and data directory"),
        (name = "channels", description = "Channel patching and preamp controls"),
        (name = "shows", description = "Stored show management"),
        (name = "sync", description = "Pushing the channel list to the mixer"),
        (name = "preamp", description = "Commands addressed to a single socket"),
        (name = "events", description = "Server-Sent Events")
    ),
    info(
        title = "sqpatch API",
        version = "0.3.0",
        description = "REST API for patching channels onto SQ mixer preamps and keeping the mixer in sync",
        license(
            name = "MIT OR Apache-2.0"
        )
    )
)]
pub struct ApiDoc;
