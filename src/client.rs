//! Client construction.

use tracing::{debug, info};

use crate::config::{ClientOptions, Endpoint, GatewayConfig};
use crate::error::{GatewayError, Result};
use crate::headers::{build_headers, SoapHeader};
use crate::ntlm::with_ntlm;
use crate::transport::{SoapTransport, TransportError, TransportFactory};

/// A constructed transport together with what it was built from.
pub struct SoapClient {
    transport: Box<dyn SoapTransport>,
    endpoint: Endpoint,
    options: ClientOptions,
    headers: Vec<SoapHeader>,
}

impl SoapClient {
    /// Build a transport for `config`.
    ///
    /// With NTLM credentials configured, the NTLM stream shim is installed
    /// for the duration of `factory.connect` only; connecting again from
    /// inside that window fails rather than waiting on itself.
    pub fn connect(config: &GatewayConfig, factory: &dyn TransportFactory) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let options = config.client_options()?;
        let headers = build_headers(&config.headers, config.wsse_username_token.as_deref());

        let connect = || factory.connect(&endpoint, &options);
        let transport = match config.ntlm_credentials() {
            Some(credentials) => {
                debug!(username = %credentials.username(), "Loading service description over NTLM");
                with_ntlm(credentials, connect)
                    .unwrap_or_else(|err| Err(TransportError::Load(err.to_string())))
            }
            None => connect(),
        };
        let mut transport =
            transport.map_err(|err| GatewayError::TransportConstruction(err.to_string()))?;

        transport.set_headers(headers.clone());
        info!(endpoint = ?endpoint, headers = headers.len(), "SOAP client constructed");

        Ok(Self {
            transport,
            endpoint,
            options,
            headers,
        })
    }

    pub fn transport(&self) -> &dyn SoapTransport {
        self.transport.as_ref()
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Headers handed to the transport.
    pub fn headers(&self) -> &[SoapHeader] {
        &self.headers
    }
}
