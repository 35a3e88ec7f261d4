//! MQTT v5 CONNACK reason codes, for readable connection diagnostics.

use rumqttc::v5::mqttbytes::v5::ConnectReturnCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReasonCode(pub u8);

const TABLE: &[(u8, &str, &str)] = &[
    (0x00, "Success", "The Connection is accepted."),
    (0x80, "Unspecified error", "The Server does not wish to reveal the reason for the failure, or none of the other Reason Codes apply."),
    (0x81, "Malformed Packet", "Data within the CONNECT packet could not be correctly parsed."),
    (0x82, "Protocol Error", "Data in the CONNECT packet does not conform to this specification."),
    (0x83, "Implementation specific error", "The CONNECT is valid but is not accepted by this Server."),
    (0x84, "Unsupported Protocol Version", "The Server does not support the version of the MQTT protocol requested by the Client."),
    (0x85, "Client Identifier not valid", "The Client Identifier is a valid string but is not allowed by the Server."),
    (0x86, "Bad User Name or Password", "The Server does not accept the User Name or Password specified by the Client."),
    (0x87, "Not authorized", "The Client is not authorized to connect."),
    (0x88, "Server unavailable", "The MQTT Server is not available."),
    (0x89, "Server busy", "The Server is busy. Try again later."),
    (0x8A, "Banned", "This Client has been banned by administrative action."),
    (0x8C, "Bad authentication method", "The authentication method is not supported or does not match the method currently in use."),
    (0x90, "Topic Name invalid", "The Will Topic Name is not malformed, but is not accepted by this Server."),
    (0x95, "Packet too large", "The CONNECT packet exceeded the maximum permissible size."),
    (0x97, "Quota exceeded", "An implementation or administrative imposed limit has been exceeded."),
    (0x99, "Payload format invalid", "The Will Payload does not match the specified Payload Format Indicator."),
    (0x9A, "Retain not supported", "The Server does not support retained messages, and Will Retain was set to 1."),
    (0x9B, "QoS not supported", "The Server does not support the QoS set in Will QoS."),
    (0x9C, "Use another server", "The Client should temporarily use another server."),
    (0x9D, "Server moved", "The Client should permanently use another server."),
    (0x9F, "Connection rate exceeded", "The connection rate limit has been exceeded."),
];

impl ReasonCode {
    fn entry(&self) -> Option<&'static (u8, &'static str, &'static str)> {
        TABLE.iter().find(|(code, _, _)| *code == self.0)
    }

    pub fn name(&self) -> &'static str {
        self.entry().map(|(_, name, _)| *name).unwrap_or("Unknown")
    }

    pub fn description(&self) -> &'static str {
        self.entry().map(|(_, _, desc)| *desc).unwrap_or("Unknown")
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:02X} ({}): {}", self.0, self.name(), self.description())
    }
}

impl From<ConnectReturnCode> for ReasonCode {
    fn from(code: ConnectReturnCode) -> Self {
        use ConnectReturnCode::*;
        Self(match code {
            Success => 0x00,
            UnspecifiedError => 0x80,
            MalformedPacket => 0x81,
            ProtocolError => 0x82,
            ImplementationSpecificError => 0x83,
            RefusedProtocolVersion | UnsupportedProtocolVersion => 0x84,
            BadClientId | ClientIdentifierNotValid => 0x85,
            BadUserNamePassword => 0x86,
            NotAuthorized => 0x87,
            ServiceUnavailable | ServerUnavailable => 0x88,
            ServerBusy => 0x89,
            Banned => 0x8A,
            BadAuthenticationMethod => 0x8C,
            TopicNameInvalid => 0x90,
            PacketTooLarge => 0x95,
            QuotaExceeded => 0x97,
            PayloadFormatInvalid => 0x99,
            RetainNotSupported => 0x9A,
            QoSNotSupported => 0x9B,
            UseAnotherServer => 0x9C,
            ServerMoved => 0x9D,
            ConnectionRateExceeded => 0x9F,
        })
    }
}
