//
// Copyright 2017-2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Configuration tests for kioken-service

use kioken_pool::{PoolConfig, PoolError};
use kioken_service::{ServerConfig, ServiceError};
use std::net::SocketAddr;
use std::time::Duration;

#[test]
fn test_server_config_defaults() {
    let config = ServerConfig::default();
    assert_eq!(config.bind_address, "0.0.0.0:1234".parse::<SocketAddr>().unwrap());
    assert_eq!(config.acceptors, 5);
    assert_eq!(config.admission_timeout, Duration::from_millis(100));
    assert_eq!(config.read_timeout, Duration::from_secs(10));
    assert_eq!(config.read_buffer_size, 1024);
    assert_eq!(config.stats_interval, Duration::from_secs(1));
    assert_eq!(config.shutdown_timeout, Duration::from_secs(30));
}

#[test]
fn test_server_config_new() {
    let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
    let config = ServerConfig::new(addr);
    assert_eq!(config.bind_address, addr);
    assert_eq!(config.acceptors, ServerConfig::default().acceptors);
}

#[test]
fn test_pool_config_defaults() {
    let config = PoolConfig::default();
    assert_eq!(config.capacity, 64);
    assert_eq!(config.min_capacity, 1);
    assert_eq!(config.idle_timeout, Duration::from_secs(60));
    assert_eq!(config.queue_depth, 1024);
    assert!(config.validate().is_ok());
}

#[test]
fn test_zero_buffer_is_rejected() {
    let config = ServerConfig::default().with_read_buffer_size(0);
    match config.validate() {
        Err(ServiceError::InvalidConfig(reason)) => assert!(reason.contains("read_buffer_size")),
        other => panic!("expected invalid config, got {:?}", other),
    }
}

#[test]
fn test_zero_shutdown_timeout_is_rejected() {
    let config = ServerConfig::default().with_shutdown_timeout(Duration::ZERO);
    assert!(matches!(config.validate(), Err(ServiceError::InvalidConfig(_))));
}

#[test]
fn test_pool_floor_above_capacity_is_rejected() {
    let config =
        ServerConfig::default().with_pool(PoolConfig::new(2).with_min_capacity(4));
    assert!(matches!(
        config.validate(),
        Err(ServiceError::Pool(PoolError::InvalidConfig(_)))
    ));
}

#[test]
fn test_zero_admission_timeout_is_valid() {
    let config = ServerConfig::default().with_admission_timeout(Duration::ZERO);
    assert!(config.validate().is_ok());
}
