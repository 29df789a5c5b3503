//! MQTT Packet Decoder

use bytes::Bytes;

use super::{read_variable_int, PacketReader, DEFAULT_MAX_PACKET_SIZE, MAX_REMAINING_LENGTH};
use crate::protocol::{
    ConnAck, Connect, ConnectReturnCode, DecodeError, Packet, PacketType, PubAck, Publish, QoS,
    SubAck, Subscribe, Subscription,
};

/// MQTT v3.1.1 Packet Decoder
#[derive(Debug, Clone)]
pub struct Decoder {
    /// Maximum remaining length accepted
    max_packet_size: usize,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    pub fn with_max_packet_size(mut self, size: usize) -> Self {
        self.max_packet_size = size.min(MAX_REMAINING_LENGTH);
        self
    }

    /// Decode one packet from the front of the buffer
    ///
    /// Returns `Ok(None)` while the buffer holds only part of a packet,
    /// otherwise the packet and the number of bytes it occupied.
    pub fn decode(&self, buf: &[u8]) -> Result<Option<(Packet, usize)>, DecodeError> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let first_byte = buf[0];
        let packet_type = first_byte >> 4;
        let flags = first_byte & 0x0F;

        let (remaining_length, len_bytes) = match read_variable_int(&buf[1..]) {
            Ok(r) => r,
            Err(DecodeError::InsufficientData) => return Ok(None),
            Err(e) => return Err(e),
        };

        if remaining_length as usize > self.max_packet_size {
            return Err(DecodeError::PacketTooLarge);
        }

        let total_len = 1 + len_bytes + remaining_length as usize;
        if buf.len() < total_len {
            return Ok(None);
        }

        let body = PacketReader::new(&buf[1 + len_bytes..total_len]);

        let packet = match PacketType::from_u8(packet_type) {
            Some(PacketType::Connect) => self.decode_connect(flags, body)?,
            Some(PacketType::ConnAck) => self.decode_connack(flags, body)?,
            Some(PacketType::Publish) => self.decode_publish(flags, body)?,
            Some(PacketType::PubAck) => {
                Self::expect_flags(flags, 0)?;
                Packet::PubAck(PubAck {
                    packet_id: Self::packet_id(body)?,
                })
            }
            Some(PacketType::Subscribe) => self.decode_subscribe(flags, body)?,
            Some(PacketType::SubAck) => self.decode_suback(flags, body)?,
            Some(PacketType::PingReq) => {
                Self::expect_flags(flags, 0)?;
                Packet::PingReq
            }
            Some(PacketType::PingResp) => {
                Self::expect_flags(flags, 0)?;
                Packet::PingResp
            }
            Some(PacketType::Disconnect) => {
                Self::expect_flags(flags, 0)?;
                Packet::Disconnect
            }
            // QoS 2 flow and unsubscribe are never used by the bridge
            Some(_) => return Err(DecodeError::UnexpectedPacketType(packet_type)),
            None => return Err(DecodeError::InvalidPacketType(packet_type)),
        };

        Ok(Some((packet, total_len)))
    }

    fn expect_flags(flags: u8, expected: u8) -> Result<(), DecodeError> {
        if flags != expected {
            return Err(DecodeError::InvalidFlags);
        }
        Ok(())
    }

    fn packet_id(mut body: PacketReader<'_>) -> Result<u16, DecodeError> {
        let id = body.read_u16()?;
        if id == 0 {
            return Err(DecodeError::MalformedPacket("packet id cannot be 0"));
        }
        Ok(id)
    }

    fn decode_connect(&self, flags: u8, mut body: PacketReader<'_>) -> Result<Packet, DecodeError> {
        Self::expect_flags(flags, 0)?;

        if body.read_string()? != "MQTT" {
            return Err(DecodeError::MalformedPacket("invalid protocol name"));
        }
        if body.read_u8()? != crate::protocol::PROTOCOL_LEVEL {
            return Err(DecodeError::MalformedPacket("unsupported protocol level"));
        }

        let connect_flags = body.read_u8()?;
        if (connect_flags & 0x01) != 0 {
            return Err(DecodeError::InvalidFlags);
        }
        let username_flag = (connect_flags & 0x80) != 0;
        let password_flag = (connect_flags & 0x40) != 0;
        if password_flag && !username_flag {
            return Err(DecodeError::InvalidFlags);
        }
        // Will messages are not part of the bridge protocol
        if (connect_flags & 0x04) != 0 {
            return Err(DecodeError::MalformedPacket("will message not supported"));
        }

        let keep_alive = body.read_u16()?;
        let client_id = body.read_string()?.to_string();
        let username = if username_flag {
            Some(body.read_string()?.to_string())
        } else {
            None
        };
        let password = if password_flag {
            Some(Bytes::copy_from_slice(body.read_binary()?))
        } else {
            None
        };

        Ok(Packet::Connect(Box::new(Connect {
            client_id,
            clean_session: (connect_flags & 0x02) != 0,
            keep_alive,
            username,
            password,
        })))
    }

    fn decode_connack(&self, flags: u8, mut body: PacketReader<'_>) -> Result<Packet, DecodeError> {
        Self::expect_flags(flags, 0)?;

        let acknowledge_flags = body.read_u8()?;
        if (acknowledge_flags & 0xFE) != 0 {
            return Err(DecodeError::InvalidFlags);
        }
        let code = body.read_u8()?;
        let return_code =
            ConnectReturnCode::from_u8(code).ok_or(DecodeError::InvalidReturnCode(code))?;

        Ok(Packet::ConnAck(ConnAck {
            session_present: (acknowledge_flags & 0x01) != 0,
            return_code,
        }))
    }

    fn decode_publish(&self, flags: u8, mut body: PacketReader<'_>) -> Result<Packet, DecodeError> {
        let dup = (flags & 0x08) != 0;
        let qos_bits = (flags >> 1) & 0x03;
        let retain = (flags & 0x01) != 0;

        let qos = QoS::from_u8(qos_bits).ok_or(DecodeError::InvalidQoS(qos_bits))?;
        if qos == QoS::AtMostOnce && dup {
            return Err(DecodeError::MalformedPacket("DUP must be 0 for QoS 0"));
        }

        let topic = body.read_string()?;
        if topic.contains(&['+', '#'][..]) {
            return Err(DecodeError::MalformedPacket("topic contains wildcard"));
        }

        let packet_id = if qos != QoS::AtMostOnce {
            let id = body.read_u16()?;
            if id == 0 {
                return Err(DecodeError::MalformedPacket("packet id cannot be 0"));
            }
            Some(id)
        } else {
            None
        };

        Ok(Packet::Publish(Publish {
            dup,
            qos,
            retain,
            topic: topic.to_string(),
            packet_id,
            payload: Bytes::copy_from_slice(body.rest()),
        }))
    }

    fn decode_subscribe(
        &self,
        flags: u8,
        mut body: PacketReader<'_>,
    ) -> Result<Packet, DecodeError> {
        Self::expect_flags(flags, 0x02)?;

        let packet_id = body.read_u16()?;
        let mut subscriptions = Vec::new();
        while body.remaining() > 0 {
            let filter = body.read_string()?.to_string();
            let requested = body.read_u8()?;
            let qos = QoS::from_u8(requested).ok_or(DecodeError::InvalidQoS(requested))?;
            subscriptions.push(Subscription { filter, qos });
        }
        if subscriptions.is_empty() {
            return Err(DecodeError::MalformedPacket("SUBSCRIBE without filters"));
        }

        Ok(Packet::Subscribe(Subscribe {
            packet_id,
            subscriptions,
        }))
    }

    fn decode_suback(&self, flags: u8, mut body: PacketReader<'_>) -> Result<Packet, DecodeError> {
        Self::expect_flags(flags, 0)?;

        let packet_id = body.read_u16()?;
        let granted = body
            .rest()
            .iter()
            .map(|&code| match code {
                0x80 => Ok(None),
                _ => QoS::from_u8(code)
                    .map(Some)
                    .ok_or(DecodeError::InvalidQoS(code)),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Packet::SubAck(SubAck { packet_id, granted }))
    }
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new()
    }
}
