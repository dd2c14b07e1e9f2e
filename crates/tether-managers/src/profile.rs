//! Profile state tracking.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use tether_extension::events::Event;
use tether_extension::intercept::{HandlerResult, Intercept};
use tether_extension::{ExtError, Extension};
use tether_protocol::{Packet, Parse, Result as ProtocolResult};

use crate::{inbound, outbound};

/// The user's profile, parsed from the key=value user object blob.
#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub name: String,
    pub figure: String,
    pub gender: String,
    pub custom_data: String,
    pub ph_tickets: i32,
    pub ph_figure: String,
    pub photo_film: i32,
    pub direct_mail: i32,
    pub online_status: bool,
    pub public_profile_enabled: bool,
    pub friend_requests_enabled: bool,
    pub offline_messaging_enabled: bool,
}

impl Profile {
    fn parse_blob(blob: &str) -> Self {
        fn int_field(key: &str, value: &str) -> i32 {
            value.parse().unwrap_or_else(|_| {
                tracing::warn!(key, value, "invalid integer in user object");
                0
            })
        }

        let mut profile = Self::default();
        for line in blob.split('\r') {
            let Some((key, value)) = line.split_once('=') else {
                if !line.is_empty() {
                    tracing::warn!(line, "malformed user object line");
                }
                continue;
            };
            match key {
                "name" => profile.name = value.to_owned(),
                "figure" => profile.figure = value.to_owned(),
                "sex" => profile.gender = value.to_owned(),
                "customData" => profile.custom_data = value.to_owned(),
                "ph_tickets" => profile.ph_tickets = int_field(key, value),
                "ph_figure" => profile.ph_figure = value.to_owned(),
                "photo_film" => profile.photo_film = int_field(key, value),
                "directMail" => profile.direct_mail = int_field(key, value),
                "onlineStatus" => profile.online_status = value == "1",
                "publicProfileEnabled" => profile.public_profile_enabled = value == "1",
                "friendRequestsEnabled" => profile.friend_requests_enabled = value == "1",
                "offlineMessagingEnabled" => profile.offline_messaging_enabled = value == "1",
                _ => {}
            }
        }
        profile
    }
}

impl Parse for Profile {
    fn parse(p: &mut Packet) -> ProtocolResult<Self> {
        Ok(Self::parse_blob(&p.read_string()?))
    }
}

/// Arguments for profile events.
#[derive(Debug, Clone)]
pub struct ProfileArgs {
    pub profile: Profile,
}

struct ProfileInner {
    ext: Extension,
    updated: Event<ProfileArgs>,
    request_on_connect: AtomicBool,
    profile: RwLock<Profile>,
}

/// Tracks the user's own profile.
///
/// The user object arrives naturally during login. If the extension
/// attached to an already-active connection, it is requested explicitly
/// on the next connect.
pub struct ProfileManager {
    inner: Arc<ProfileInner>,
}

impl ProfileManager {
    /// Creates a profile manager subscribed to the user object packet of
    /// `ext`.
    pub fn new(ext: &Extension) -> Result<Self, ExtError> {
        let inner = Arc::new(ProfileInner {
            ext: ext.clone(),
            updated: Event::new(),
            request_on_connect: AtomicBool::new(false),
            profile: RwLock::new(Profile::default()),
        });

        {
            let inner = Arc::clone(&inner);
            ext.on_initialized(move |args| {
                if args.connected {
                    // Attached mid-connection; the user object will not
                    // arrive on its own.
                    inner.request_on_connect.store(true, Ordering::SeqCst);
                    tracing::debug!("game already connected, will request profile");
                }
            });
        }
        {
            let inner = Arc::clone(&inner);
            ext.on_connected(move |_| {
                if inner.request_on_connect.load(Ordering::SeqCst) {
                    if let Err(err) = inner.ext.send(outbound::INFORETRIEVE, &()) {
                        tracing::warn!(error = %err, "failed to request profile");
                    } else {
                        tracing::debug!("requested profile");
                    }
                }
            });
        }
        {
            let inner = Arc::clone(&inner);
            ext.on_disconnected(move || {
                inner.request_on_connect.store(false, Ordering::SeqCst);
            });
        }
        {
            let inner = Arc::clone(&inner);
            ext.intercept([inbound::USER_OBJ])
                .with(move |e| inner.handle_user_obj(e))?;
        }

        Ok(Self { inner })
    }

    /// The most recently received profile.
    pub fn profile(&self) -> Profile {
        self.inner.profile.read().clone()
    }

    /// Registers a handler invoked when the profile is updated.
    pub fn updated(&self, handler: impl Fn(&ProfileArgs) + Send + Sync + 'static) {
        self.inner.updated.register(handler);
    }
}

impl ProfileInner {
    fn handle_user_obj(&self, e: &mut Intercept) -> HandlerResult {
        let profile: Profile = e.packet.read()?;
        tracing::debug!(name = %profile.name, "received user profile");
        *self.profile.write() = profile.clone();
        self.updated.dispatch(&ProfileArgs { profile });
        Ok(())
    }
}
