pub mod device_po;
