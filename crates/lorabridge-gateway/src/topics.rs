/*!
 * ThingsBoard MQTT topics used by the gateway.
 */

/// Announces a device behind the gateway
pub const DEVICE_CONNECT: &str = "v1/gateway/connect";

/// Telemetry for devices behind the gateway
pub const TELEMETRY: &str = "v1/gateway/telemetry";

/// Commands for devices behind the gateway, and their replies
pub const RPC_GATEWAY: &str = "v1/gateway/rpc";

/// Prefix of commands addressed to the gateway itself
pub const RPC_ME: &str = "v1/devices/me/rpc/request/";

/// Subscription filter for commands addressed to the gateway itself
pub const RPC_ME_SUBSCRIBE: &str = "v1/devices/me/rpc/request/+";

/// Prefix of replies to commands addressed to the gateway itself
pub const RPC_ME_RESPOND: &str = "v1/devices/me/rpc/response/";

/// Client attributes of the gateway itself
pub const ATTRIBUTES: &str = "v1/devices/me/attributes";

/// Reply topic for a self-addressed request id
pub fn rpc_me_response(request_id: &str) -> String {
    format!("{}{}", RPC_ME_RESPOND, request_id)
}

/// Request id carried in the last segment of a self-addressed request topic
pub fn request_id(topic: &str) -> Option<&str> {
    topic
        .rsplit_once('/')
        .map(|(_, id)| id)
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_id() {
        assert_eq!(request_id("v1/devices/me/rpc/request/42"), Some("42"));
        assert_eq!(request_id("v1/devices/me/rpc/request/"), None);
        assert_eq!(request_id("no-slashes"), None);
    }

    #[test]
    fn test_response_topic() {
        assert_eq!(rpc_me_response("42"), "v1/devices/me/rpc/response/42");
    }
}
