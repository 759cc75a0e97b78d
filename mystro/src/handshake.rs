//! Connection handshake and authentication.
use crate::{
    Result,
    common::{ByteStr, span, verbose},
    connection::{Config, TlsMode},
    error::Error,
    mysql::{
        Capabilities, capability,
        auth::{AuthPlugin, UnsupportedAuth},
        backend::{AuthReply, Greeting, OkPacket},
        frontend::{AuthData, HandshakeResponse, SslRequest},
        error::ProtocolError,
    },
    net::{TlsUnsupported, TlsUpgrader},
    stream::MySqlStream,
    transport::MySqlTransportExt,
};

/// `utf8mb4_general_ci`
const DEFAULT_CHARSET: u8 = 45;

/// Facts established by a completed handshake.
#[derive(Debug, Clone)]
pub struct HandshakeInfo {
    pub server_version: ByteStr,
    pub connection_id: u32,
    pub capabilities: Capabilities,
    pub status: u16,
}

/// Perform the connection phase: greeting, optional TLS upgrade,
/// credentials and the authentication exchange.
pub async fn handshake(stream: &mut MySqlStream, config: &Config) -> Result<HandshakeInfo> {
    span!("handshake");

    stream.begin_command();
    let greeting = stream.recv::<Greeting>().await?;

    verbose!(
        version = &*greeting.server_version,
        connection_id = greeting.connection_id,
        plugin = &*greeting.auth_plugin,
        "greeting",
    );

    let mut requested = capability::CLIENT_LONG_PASSWORD
        | capability::CLIENT_PROTOCOL_41
        | capability::CLIENT_TRANSACTIONS
        | capability::CLIENT_SECURE_CONNECTION
        | capability::CLIENT_PLUGIN_AUTH
        | capability::CLIENT_MULTI_RESULTS
        | capability::CLIENT_PS_MULTI_RESULTS;

    if !config.dbname.is_empty() {
        requested |= capability::CLIENT_CONNECT_WITH_DB;
    }

    if config.multi_statements {
        requested |= capability::CLIENT_MULTI_STATEMENTS;
    }

    let upgrader: Option<&dyn TlsUpgrader> = match &config.tls {
        TlsMode::Disabled => None,
        TlsMode::Preferred(upgrader) => {
            match greeting.capabilities.contains(capability::CLIENT_SSL) {
                true => Some(&**upgrader),
                false => None,
            }
        },
        TlsMode::Required(upgrader) => {
            if !greeting.capabilities.contains(capability::CLIENT_SSL) {
                return Err(TlsUnsupported.into());
            }
            Some(&**upgrader)
        },
    };

    if upgrader.is_some() {
        requested |= capability::CLIENT_SSL;
    }

    let capabilities = Capabilities::new(requested).intersect(greeting.capabilities);
    let secure = match upgrader {
        Some(upgrader) => {
            stream.send(SslRequest { capabilities: capabilities.bits(), charset: DEFAULT_CHARSET });
            stream.flush().await?;
            stream.upgrade_tls(upgrader, &config.host).await?;
            verbose!("tls established");
            true
        },
        None => false,
    };

    let plugin = AuthPlugin::from_name(&greeting.auth_plugin)?;
    let auth_response = plugin.auth_response(&config.pass, &greeting.auth_data, secure)?;

    stream.send(HandshakeResponse {
        capabilities: capabilities.bits(),
        charset: DEFAULT_CHARSET,
        user: &config.user,
        auth_response: &auth_response,
        database: match config.dbname.is_empty() {
            true => None,
            false => Some(&config.dbname),
        },
        auth_plugin: plugin.name(),
    });
    stream.flush().await?;

    let ok = auth_exchange(stream, &config.pass, secure).await.map_err(Error::into_auth)?;

    Ok(HandshakeInfo {
        server_version: greeting.server_version,
        connection_id: greeting.connection_id,
        capabilities,
        status: ok.status,
    })
}

async fn auth_exchange(
    stream: &mut MySqlStream,
    password: &str,
    secure: bool,
) -> Result<OkPacket> {
    let mut switched = false;

    loop {
        match stream.recv::<AuthReply>().await? {
            AuthReply::Ok(ok) => return Ok(ok),
            AuthReply::Switch(switch) => {
                // a second switch would let a spoofed server downgrade at will
                if switched {
                    return Err(ProtocolError::unexpected_byte(0xfe, "authentication").into());
                }
                switched = true;

                verbose!(plugin = &*switch.plugin, "auth switch");
                let plugin = AuthPlugin::from_name(&switch.plugin)?;
                let nonce = trim_nul(&switch.data);
                let response = plugin.auth_response(password, nonce, secure)?;

                stream.send(AuthData { data: &response });
                stream.flush().await?;
            },
            AuthReply::MoreData(data) => match data.first() {
                // caching_sha2_password fast path hit, OK follows
                Some(0x03) => continue,
                // full authentication, clear password over TLS only
                Some(0x04) => {
                    if !secure {
                        return Err(UnsupportedAuth::FullAuthInsecure.into());
                    }
                    let mut clear = Vec::with_capacity(password.len() + 1);
                    clear.extend_from_slice(password.as_bytes());
                    clear.push(0);
                    stream.send(AuthData { data: &clear });
                    stream.flush().await?;
                },
                Some(&found) => {
                    return Err(ProtocolError::unexpected_byte(found, "authentication").into());
                },
                None => return Err(ProtocolError::truncated("auth more data").into()),
            },
        }
    }
}

/// Auth switch challenges carry a trailing nul that is not part of the nonce.
fn trim_nul(data: &[u8]) -> &[u8] {
    match data.last() {
        Some(0) => &data[..data.len() - 1],
        _ => data,
    }
}
