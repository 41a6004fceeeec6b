// SPDX-License-Identifier: Apache-2.0

#[cfg(test)]
mod dhcp;
#[cfg(test)]
mod tcp_mqtt;

mod env;
