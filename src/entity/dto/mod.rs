pub mod device_command_dto;
pub mod device_event_dto;
