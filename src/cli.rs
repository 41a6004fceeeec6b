// SPDX-License-Identifier: Apache-2.0

use std::{net::Ipv4Addr, str::FromStr};

use crate::{ErrorKind, Link, NetError, Stack};

const SUPPORTED_INPUTS: [&str; 3] = ["PUSHBUTTON", "UART", "UDP"];
const SUPPORTED_OUTPUTS: [&str; 3] = ["LED", "UART", "UDP"];

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DhcpCommand {
    On,
    Off,
    Refresh,
    Release,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum SetTarget {
    Ip,
    Gateway,
    Dns,
    SubnetMask,
    MqttBroker,
}

impl std::fmt::Display for SetTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::Ip => "ip",
                Self::Gateway => "gw",
                Self::Dns => "dns",
                Self::SubnetMask => "sn",
                Self::MqttBroker => "mqtt",
            }
        )
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum HelpTopic {
    Inputs,
    Outputs,
    Subs,
}

/// One operator command line.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Command {
    Dhcp(DhcpCommand),
    Set(SetTarget, Ipv4Addr),
    Ifconfig,
    Connect,
    Disconnect,
    Subscribe(String),
    Unsubscribe(String),
    Publish { topic: String, value: String },
    Help(Option<HelpTopic>),
}

fn invalid(msg: String) -> NetError {
    let e = NetError::new(ErrorKind::InvalidArgument, msg);
    log::error!("{e}");
    e
}

impl FromStr for Command {
    type Err = NetError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        Self::parse(line)
    }
}

impl Command {
    /// Command words are case-insensitive, topics and values keep their
    /// case.
    pub fn parse(line: &str) -> Result<Self, NetError> {
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            return Err(invalid("Empty command".to_string()));
        };
        let cmd = cmd.to_ascii_lowercase();
        let arg = words.next();
        let ret = match cmd.as_str() {
            "dhcp" => {
                let arg = arg.map(str::to_ascii_lowercase);
                Self::Dhcp(match arg.as_deref() {
                    Some("on") => DhcpCommand::On,
                    Some("off") => DhcpCommand::Off,
                    Some("refresh") => DhcpCommand::Refresh,
                    Some("release") => DhcpCommand::Release,
                    _ => {
                        return Err(invalid(
                            "Usage: dhcp {on|off|refresh|release}".to_string(),
                        ))
                    }
                })
            }
            "set" => {
                let target = match arg.map(str::to_ascii_lowercase).as_deref()
                {
                    Some("ip") => SetTarget::Ip,
                    Some("gw") => SetTarget::Gateway,
                    Some("dns") => SetTarget::Dns,
                    Some("sn") => SetTarget::SubnetMask,
                    Some("mqtt") => SetTarget::MqttBroker,
                    _ => {
                        return Err(invalid(
                            "Usage: set {ip|gw|dns|sn|mqtt} <a.b.c.d>"
                                .to_string(),
                        ))
                    }
                };
                let Some(addr) = words.next() else {
                    return Err(invalid(format!(
                        "Missing address for set {target}"
                    )));
                };
                let addr = Ipv4Addr::from_str(addr).map_err(|e| {
                    invalid(format!("Invalid IPv4 address {addr}: {e}"))
                })?;
                Self::Set(target, addr)
            }
            "ifconfig" => Self::Ifconfig,
            "connect" => Self::Connect,
            "disconnect" => Self::Disconnect,
            "subscribe" | "unsubscribe" => {
                let Some(topic) = arg else {
                    return Err(invalid(format!("Usage: {cmd} <topic>")));
                };
                if cmd == "subscribe" {
                    Self::Subscribe(topic.to_string())
                } else {
                    Self::Unsubscribe(topic.to_string())
                }
            }
            "publish" => {
                let (Some(topic), Some(value)) = (arg, words.next()) else {
                    return Err(invalid(
                        "Usage: publish <topic> <value>".to_string(),
                    ));
                };
                Self::Publish {
                    topic: topic.to_string(),
                    value: value.to_string(),
                }
            }
            "help" => {
                Self::Help(match arg.map(str::to_ascii_lowercase).as_deref() {
                    Some("inputs") => Some(HelpTopic::Inputs),
                    Some("outputs") => Some(HelpTopic::Outputs),
                    Some("subs") => Some(HelpTopic::Subs),
                    _ => None,
                })
            }
            _ => return Err(invalid(format!("Unknown command {cmd}"))),
        };
        Ok(ret)
    }

    /// Run the command against the stack and return the text to show the
    /// operator.
    pub fn execute<L: Link>(
        &self,
        stack: &mut Stack<L>,
    ) -> Result<String, NetError> {
        log::debug!("Executing {self:?}");
        match self {
            Self::Dhcp(DhcpCommand::On) => {
                stack.enable_dhcp()?;
                Ok("DHCP enabled\n".to_string())
            }
            Self::Dhcp(DhcpCommand::Off) => {
                stack.disable_dhcp();
                Ok("DHCP disabled\n".to_string())
            }
            Self::Dhcp(DhcpCommand::Refresh) => {
                stack.refresh_dhcp()?;
                Ok("DHCP request sent\n".to_string())
            }
            Self::Dhcp(DhcpCommand::Release) => {
                stack.release_dhcp()?;
                Ok("DHCP lease released\n".to_string())
            }
            Self::Set(target, addr) => {
                match target {
                    SetTarget::Ip => stack.set_ip(*addr),
                    SetTarget::Gateway => stack.set_gateway(*addr),
                    SetTarget::Dns => stack.set_dns(*addr),
                    SetTarget::SubnetMask => stack.set_subnet_mask(*addr),
                    SetTarget::MqttBroker => stack.set_mqtt_broker(*addr),
                }
                Ok(format!("{target} set to {addr}\n"))
            }
            Self::Ifconfig => Ok(stack.ifconfig()),
            Self::Connect => {
                stack.mqtt_connect()?;
                Ok(format!(
                    "Connecting to MQTT broker {}\n",
                    stack.mqtt().broker_ip()
                ))
            }
            Self::Disconnect => {
                stack.mqtt_disconnect()?;
                Ok("MQTT disconnected\n".to_string())
            }
            Self::Subscribe(topic) => {
                let id = stack.mqtt_subscribe(topic)?;
                Ok(format!("Subscribing to {topic} as topic {id}\n"))
            }
            Self::Unsubscribe(topic) => {
                stack.mqtt_unsubscribe(topic)?;
                Ok(format!("Unsubscribing from {topic}\n"))
            }
            Self::Publish { topic, value } => {
                stack.mqtt_publish(topic, value.as_bytes())?;
                Ok(format!("Published {value} to {topic}\n"))
            }
            Self::Help(topic) => {
                let mut ret = String::new();
                if matches!(topic, None | Some(HelpTopic::Inputs)) {
                    ret += &help_list("supported inputs", &SUPPORTED_INPUTS);
                }
                if matches!(topic, None | Some(HelpTopic::Outputs)) {
                    ret += &help_list("supported outputs", &SUPPORTED_OUTPUTS);
                }
                if matches!(topic, None | Some(HelpTopic::Subs)) {
                    ret += &subscribed_topics(stack);
                }
                Ok(ret)
            }
        }
    }
}

fn help_list(title: &str, items: &[&str]) -> String {
    format!("{title}:\n{}\n", items.join(", "))
}

fn subscribed_topics<L: Link>(stack: &Stack<L>) -> String {
    let topics = stack.mqtt().topics();
    if topics.is_empty() {
        return "subscribed topics: none\n".to_string();
    }
    let mut ret = "subscribed topics:\n".to_string();
    for topic in topics.iter() {
        ret += &format!("{:>3} {}\n", topic.id, topic.name);
    }
    ret
}
