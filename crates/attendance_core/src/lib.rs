pub mod credentials;
pub mod domain;
pub mod ports;
pub mod stats;

pub use domain::{
    AdminSeed, Attachment, AttendanceQuery, AttendanceRecord, AttendanceStatus, Cie, ErrorBody,
    HealthStatus, LoginRequest, MessageResponse, NewUser, Notice, NoticeQuery, NoticeUpdate,
    PasswordResetRequest, Role, SettingsUpdate, StoreConnectionState, SystemSettings, User,
    UserUpdate,
};
pub use ports::{AttendanceStore, PortError, PortResult};
