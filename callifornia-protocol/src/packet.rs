//! Wire `packet_type` catalogue (§6.1).

use crate::error::ProtocolError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum PacketType {
    Ping = 0,
    Pong = 1,
    Authorization = 2,
    AuthorizationResult = 3,
    Logout = 4,
    Reconnect = 5,
    ReconnectResult = 6,
    GetUserInfo = 7,
    GetUserInfoResult = 8,
    CallingBegin = 9,
    CallingEnd = 10,
    CallAccept = 11,
    CallDecline = 12,
    CallEnd = 13,
    ConnectionDownWithUser = 14,
    ConnectionRestoredWithUser = 15,
    UserLogout = 16,
    Confirmation = 17,
    Voice = 18,
    Screen = 19,
    Camera = 20,
}

impl PacketType {
    /// True for the opaque media types the relay forwards verbatim without
    /// touching JSON at all (§4.8).
    pub fn is_media(self) -> bool {
        matches!(self, PacketType::Voice | PacketType::Screen | PacketType::Camera)
    }

    /// True for messages that carry a `uid` and expect a `CONFIRMATION`
    /// echo, per the "Reliable?" column of §6.1.
    pub fn is_reliable(self) -> bool {
        matches!(
            self,
            PacketType::Authorization
                | PacketType::Logout
                | PacketType::Reconnect
                | PacketType::GetUserInfo
                | PacketType::ConnectionDownWithUser
                | PacketType::ConnectionRestoredWithUser
                | PacketType::UserLogout
        )
    }
}

impl From<PacketType> for u32 {
    fn from(value: PacketType) -> Self {
        value as u32
    }
}

impl TryFrom<u32> for PacketType {
    type Error = ProtocolError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        use PacketType::*;
        Ok(match value {
            0 => Ping,
            1 => Pong,
            2 => Authorization,
            3 => AuthorizationResult,
            4 => Logout,
            5 => Reconnect,
            6 => ReconnectResult,
            7 => GetUserInfo,
            8 => GetUserInfoResult,
            9 => CallingBegin,
            10 => CallingEnd,
            11 => CallAccept,
            12 => CallDecline,
            13 => CallEnd,
            14 => ConnectionDownWithUser,
            15 => ConnectionRestoredWithUser,
            16 => UserLogout,
            17 => Confirmation,
            18 => Voice,
            19 => Screen,
            20 => Camera,
            other => return Err(ProtocolError::UnknownPacketType(other)),
        })
    }
}
