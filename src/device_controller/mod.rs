//! 设备管理模块
//! - 维护设备列表，地址与校准偏移
//! - 每个设备一个轮询任务，检测连接与数据一致性
//! - 写入衰减值，与轮询互斥

pub mod attenuation_controller;
pub mod device_manager;
pub mod device_registry;
pub mod entity;
pub mod workers;
