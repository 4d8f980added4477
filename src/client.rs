use crate::connection::{CancelHandle, Connection};
use crate::discovery::{self, DeviceAddress, COMMAND_PORT};
use crate::error::{Result, YeelightError};
use crate::protocol::Response;
use crate::subscription::NotificationReceiver;
use crate::types::{Effect, Flow, Mode, Power, PropsResult, Rgb};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for connecting to one bulb
#[derive(Debug, Clone)]
pub struct YeelightConfig {
    /// Address of the bulb's command endpoint
    pub addr: DeviceAddress,
    /// Default transition effect for property changes
    pub effect: Effect,
}

impl YeelightConfig {
    /// Configuration for a bulb at the given IP on the default command port
    pub fn new(ip: IpAddr) -> Self {
        Self {
            addr: DeviceAddress::new(ip, COMMAND_PORT),
            effect: Effect::Smooth,
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effect = effect;
        self
    }
}

/// Client for controlling one Yeelight bulb
///
/// Holds a long-lived command connection and exposes typed operations on
/// top of it. Command names and arguments are passed through opaquely via
/// [`Yeelight::execute_command`]; the typed methods are thin value
/// transforms over that call.
///
/// # Example
///
/// ```no_run
/// use yeelight_lan::{Yeelight, YeelightConfig};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = YeelightConfig::new("192.168.1.10".parse()?);
///     let bulb = Yeelight::connect(config).await?;
///     bulb.turn_on().await?;
///     bulb.set_brightness(40).await?;
///     Ok(())
/// }
/// ```
pub struct Yeelight {
    addr: DeviceAddress,
    effect: Effect,
    connection: Arc<Connection>,
}

impl Yeelight {
    /// Connect to the bulb described by `config`
    pub async fn connect(config: YeelightConfig) -> Result<Self> {
        let connection = Connection::connect(&config.addr).await?;
        Ok(Self {
            addr: config.addr,
            effect: config.effect,
            connection: Arc::new(connection),
        })
    }

    /// Discover a bulb via multicast search and connect to it
    pub async fn from_discovery(timeout: Duration) -> Result<Self> {
        let addr = discovery::discover(timeout).await?;
        Self::connect(YeelightConfig {
            addr,
            effect: Effect::Smooth,
        })
        .await
    }

    /// Address of the bulb this client talks to
    pub fn address(&self) -> DeviceAddress {
        self.addr
    }

    /// Send a raw command and wait for its correlated result
    ///
    /// The method name and params are passed through to the bulb untouched.
    pub async fn execute_command(&self, method: &str, params: Vec<Value>) -> Result<Response> {
        self.connection.send_request(method, params).await
    }

    /// Listen for unsolicited state-change notifications
    ///
    /// Opens a dedicated second connection so a slow consumer never contends
    /// with command traffic. Returns the receiver and a cancel handle; the
    /// stream runs until cancelled, until the bulb closes the socket, or
    /// until the receiver is dropped.
    pub async fn listen(&self) -> Result<(NotificationReceiver, CancelHandle)> {
        let connection = Arc::new(Connection::connect(&self.addr).await?);
        let rx = connection
            .take_notifications()
            .ok_or(YeelightError::ConnectionClosed)?;
        let handle = connection.cancel_handle();
        Ok((NotificationReceiver::new(rx, connection), handle))
    }

    /// Close the command connection
    pub async fn close(&self) {
        self.connection.close().await;
    }

    pub async fn set_power(&self, power: Power) -> Result<Response> {
        self.execute_command(
            "set_power",
            vec![json!(power.as_str()), json!(self.effect.as_str())],
        )
        .await
    }

    pub async fn turn_on(&self) -> Result<Response> {
        self.set_power(Power::On).await
    }

    /// Turn on, switching to `mode` over `duration_ms` milliseconds
    pub async fn turn_on_with(&self, mode: Mode, duration_ms: u32) -> Result<Response> {
        self.execute_command(
            "set_power",
            vec![
                json!("on"),
                json!(self.effect.as_str()),
                json!(duration_ms),
                json!(mode as u8),
            ],
        )
        .await
    }

    pub async fn turn_off(&self) -> Result<Response> {
        self.set_power(Power::Off).await
    }

    /// Turn the bulb on if its `power` property is not already "on"
    pub async fn ensure_on(&self) -> Result<()> {
        let props = self.get_props(&["power"]).await?;
        if props.get("power") != Some("on") {
            self.turn_on().await?;
        }
        Ok(())
    }

    /// Set brightness, 1-100
    pub async fn set_brightness(&self, brightness: u8) -> Result<Response> {
        check_brightness(brightness)?;
        self.ensure_on().await?;
        self.execute_command(
            "set_bright",
            vec![json!(brightness), json!(self.effect.as_str())],
        )
        .await
    }

    /// Set brightness with an explicit transition duration in milliseconds
    pub async fn set_brightness_with_duration(
        &self,
        brightness: u8,
        duration_ms: u32,
    ) -> Result<Response> {
        check_brightness(brightness)?;
        self.ensure_on().await?;
        self.execute_command(
            "set_bright",
            vec![
                json!(brightness),
                json!(self.effect.as_str()),
                json!(duration_ms),
            ],
        )
        .await
    }

    pub async fn set_rgb(&self, color: Rgb) -> Result<Response> {
        self.ensure_on().await?;
        self.execute_command(
            "set_rgb",
            vec![json!(color.to_device_value()), json!(self.effect.as_str())],
        )
        .await
    }

    /// Set color by hue (0-359) and saturation (0-100)
    pub async fn set_hsv(&self, hue: u16, saturation: u8) -> Result<Response> {
        self.ensure_on().await?;
        self.execute_command(
            "set_hsv",
            vec![json!(hue), json!(saturation), json!(self.effect.as_str())],
        )
        .await
    }

    /// Start a color flow program
    pub async fn start_flow(&self, flow: &Flow) -> Result<Response> {
        self.ensure_on().await?;
        self.execute_command("start_cf", flow.as_start_params()).await
    }

    /// Stop the running color flow
    pub async fn stop_flow(&self) -> Result<Response> {
        self.execute_command("stop_cf", vec![]).await
    }

    /// Read properties by name, e.g. `["power", "bright"]`
    ///
    /// The bulb returns values in request order; they come back keyed by the
    /// requested names.
    pub async fn get_props(&self, props: &[&str]) -> Result<PropsResult> {
        let params = props.iter().map(|p| json!(p)).collect();
        let response = self.execute_command("get_prop", params).await?;

        let values = response.result.unwrap_or_default();
        let mut map = HashMap::new();
        for (name, value) in props.iter().zip(values) {
            let value = match value {
                Value::String(s) => s,
                other => other.to_string(),
            };
            map.insert((*name).to_string(), value);
        }

        Ok(PropsResult {
            id: response.id,
            props: map,
        })
    }

    /// Set the bulb's display name
    pub async fn set_name(&self, name: &str) -> Result<Response> {
        self.execute_command("set_name", vec![json!(name)]).await
    }
}

fn check_brightness(brightness: u8) -> Result<()> {
    if !(1..=100).contains(&brightness) {
        return Err(YeelightError::InvalidBrightness(brightness));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Request;
    use std::net::Ipv4Addr;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    struct ScriptedBulb {
        lines: tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
        write: tokio::net::tcp::OwnedWriteHalf,
    }

    impl ScriptedBulb {
        async fn accept(listener: &TcpListener) -> Self {
            let (stream, _) = listener.accept().await.unwrap();
            let (read, write) = stream.into_split();
            Self {
                lines: BufReader::new(read).lines(),
                write,
            }
        }

        async fn next_request(&mut self) -> Request {
            let line = self.lines.next_line().await.unwrap().unwrap();
            serde_json::from_str(&line).unwrap()
        }

        async fn reply_result(&mut self, id: u64, result: &str) {
            let line = format!("{{\"id\":{id},\"result\":{result}}}\r\n");
            self.write.write_all(line.as_bytes()).await.unwrap();
        }

        async fn push(&mut self, line: &str) {
            self.write
                .write_all(format!("{line}\r\n").as_bytes())
                .await
                .unwrap();
        }
    }

    async fn bulb_config() -> (TcpListener, YeelightConfig) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let config = YeelightConfig {
            addr: DeviceAddress::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port),
            effect: Effect::Smooth,
        };
        (listener, config)
    }

    #[tokio::test]
    async fn brightness_is_validated_before_any_io() {
        let (listener, config) = bulb_config().await;
        tokio::spawn(async move {
            let mut bulb = ScriptedBulb::accept(&listener).await;
            // The client must never send anything for an invalid value.
            if let Ok(Some(line)) = bulb.lines.next_line().await {
                panic!("unexpected request: {line}");
            }
        });

        let client = Yeelight::connect(config).await.unwrap();
        let err = client.set_brightness(0).await.unwrap_err();
        assert!(matches!(err, YeelightError::InvalidBrightness(0)));
        let err = client.set_brightness(101).await.unwrap_err();
        assert!(matches!(err, YeelightError::InvalidBrightness(101)));
        client.close().await;
    }

    #[tokio::test]
    async fn get_props_keys_values_by_name() {
        let (listener, config) = bulb_config().await;
        tokio::spawn(async move {
            let mut bulb = ScriptedBulb::accept(&listener).await;
            let req = bulb.next_request().await;
            assert_eq!(req.method, "get_prop");
            assert_eq!(req.params, vec![json!("power"), json!("bright")]);
            bulb.reply_result(req.id, "[\"on\",\"100\"]").await;
        });

        let client = Yeelight::connect(config).await.unwrap();
        let props = client.get_props(&["power", "bright"]).await.unwrap();
        assert_eq!(props.get("power"), Some("on"));
        assert_eq!(props.get("bright"), Some("100"));
    }

    #[tokio::test]
    async fn ensure_on_powers_up_an_off_bulb() {
        let (listener, config) = bulb_config().await;
        tokio::spawn(async move {
            let mut bulb = ScriptedBulb::accept(&listener).await;

            let req = bulb.next_request().await;
            assert_eq!(req.method, "get_prop");
            bulb.reply_result(req.id, "[\"off\"]").await;

            let req = bulb.next_request().await;
            assert_eq!(req.method, "set_power");
            assert_eq!(req.params, vec![json!("on"), json!("smooth")]);
            bulb.reply_result(req.id, "[\"ok\"]").await;
        });

        let client = Yeelight::connect(config).await.unwrap();
        client.ensure_on().await.unwrap();
    }

    #[tokio::test]
    async fn ensure_on_skips_an_already_on_bulb() {
        let (listener, config) = bulb_config().await;
        tokio::spawn(async move {
            let mut bulb = ScriptedBulb::accept(&listener).await;
            let req = bulb.next_request().await;
            bulb.reply_result(req.id, "[\"on\"]").await;
            if let Ok(Some(line)) = bulb.lines.next_line().await {
                panic!("unexpected request: {line}");
            }
        });

        let client = Yeelight::connect(config).await.unwrap();
        client.ensure_on().await.unwrap();
        client.close().await;
    }

    #[tokio::test]
    async fn set_rgb_encodes_device_value() {
        let (listener, config) = bulb_config().await;
        tokio::spawn(async move {
            let mut bulb = ScriptedBulb::accept(&listener).await;

            let req = bulb.next_request().await;
            bulb.reply_result(req.id, "[\"on\"]").await;

            let req = bulb.next_request().await;
            assert_eq!(req.method, "set_rgb");
            assert_eq!(req.params, vec![json!(0xFF0000), json!("smooth")]);
            bulb.reply_result(req.id, "[\"ok\"]").await;
        });

        let client = Yeelight::connect(config).await.unwrap();
        client.set_rgb(Rgb::new(255, 0, 0)).await.unwrap();
    }

    #[tokio::test]
    async fn listen_uses_a_dedicated_connection() {
        let (listener, config) = bulb_config().await;
        tokio::spawn(async move {
            // First accept is the command connection, second the listener.
            let _command = ScriptedBulb::accept(&listener).await;
            let mut stream = ScriptedBulb::accept(&listener).await;
            stream
                .push("{\"method\":\"props\",\"params\":{\"power\":\"off\"}}")
                .await;
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = Yeelight::connect(config).await.unwrap();
        let (mut notifications, mut handle) = client.listen().await.unwrap();

        let n = notifications.recv().await.unwrap();
        assert_eq!(n.method, "props");
        assert_eq!(n.params.get("power").map(String::as_str), Some("off"));

        handle.cancel_and_wait().await;
        handle.cancel_and_wait().await;
        let err = notifications.recv().await.unwrap_err();
        assert!(matches!(err, YeelightError::ConnectionClosed));
    }

    #[tokio::test]
    async fn dropping_the_listener_closes_its_connection() {
        let (listener, config) = bulb_config().await;
        let server = tokio::spawn(async move {
            let _command = ScriptedBulb::accept(&listener).await;
            let mut listen_conn = ScriptedBulb::accept(&listener).await;
            // Resolves once the listener side closes its socket.
            while let Ok(Some(_)) = listen_conn.lines.next_line().await {}
        });

        let client = Yeelight::connect(config).await.unwrap();
        let (notifications, handle) = client.listen().await.unwrap();
        drop(notifications);
        drop(handle);

        tokio::time::timeout(Duration::from_secs(1), server)
            .await
            .expect("listen socket not closed on drop")
            .unwrap();
    }
}
