//! Runtime Diameter dictionary (spec §3/§4.1): the set of known Vendors,
//! Applications, AVPs, Commands and the Rules that bind an AVP to a command
//! or a Grouped AVP's body. Unlike the teacher's original dictionary (a
//! single XML blob parsed once into an immutable `Definition`), entities
//! here live behind an `RwLock` so a running node can learn vendor AVPs at
//! runtime (e.g. loading a second XML dictionary file after startup)
//! without restarting.

use lazy_static::lazy_static;
use serde::Deserialize;
use serde_xml_rs::from_str;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvpDataType {
    Address,
    DiameterIdentity,
    DiameterUri,
    Enumerated,
    Float32,
    Float64,
    Grouped,
    Integer32,
    Integer64,
    OctetString,
    Time,
    Unsigned32,
    Unsigned64,
    UTF8String,
}

impl AvpDataType {
    fn from_xml_name(name: &str) -> AvpDataType {
        match name {
            "UTF8String" => AvpDataType::UTF8String,
            "Integer32" => AvpDataType::Integer32,
            "Integer64" => AvpDataType::Integer64,
            "Unsigned32" => AvpDataType::Unsigned32,
            "Unsigned64" => AvpDataType::Unsigned64,
            "Enumerated" => AvpDataType::Enumerated,
            "Grouped" => AvpDataType::Grouped,
            "DiameterIdentity" => AvpDataType::DiameterIdentity,
            "DiameterURI" => AvpDataType::DiameterUri,
            "Time" => AvpDataType::Time,
            "Address" | "IPv4" | "IPv6" => AvpDataType::Address,
            "Float32" => AvpDataType::Float32,
            "Float64" => AvpDataType::Float64,
            _ => AvpDataType::OctetString,
        }
    }
}

/// Position a Rule constrains an AVP to within its owning command/group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RulePosition {
    FixedHead,
    FixedTail,
    Required,
    Optional,
}

/// `max == -1` means unbounded, matching the dictionary XML's implicit
/// "no max attribute" case.
#[derive(Debug, Clone)]
pub struct Rule {
    pub avp_code: u32,
    pub avp_vendor_id: Option<u32>,
    pub position: RulePosition,
    pub min: u32,
    pub max: i64,
}

#[derive(Debug, Clone)]
pub struct EnumVal {
    pub code: i32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct AvpEntry {
    pub code: u32,
    pub vendor_id: Option<u32>,
    pub name: String,
    pub data_type: AvpDataType,
    pub enum_vals: Vec<EnumVal>,
}

#[derive(Debug, Clone)]
pub struct CommandEntry {
    pub code: u32,
    pub application_id: u32,
    pub name: String,
    pub request_rules: Vec<Rule>,
    pub answer_rules: Vec<Rule>,
}

#[derive(Debug, Clone)]
pub struct ApplicationEntry {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct VendorEntry {
    pub id: u32,
    pub name: String,
}

#[derive(Debug, Default)]
struct Registry {
    vendors: HashMap<u32, VendorEntry>,
    applications: HashMap<u32, ApplicationEntry>,
    avps: HashMap<(u32, Option<u32>), AvpEntry>,
    avps_by_name: HashMap<String, (u32, Option<u32>)>,
    commands: HashMap<(u32, u32), CommandEntry>,
}

/// A concurrently-mutable set of known Vendors, Applications, AVPs and
/// Commands. Cloning a `Dictionary` is cheap: it shares the underlying
/// registry via `Arc`-like interior mutability through the lock.
#[derive(Debug)]
pub struct Dictionary {
    registry: RwLock<Registry>,
}

impl Dictionary {
    pub fn new() -> Dictionary {
        Dictionary {
            registry: RwLock::new(Registry::default()),
        }
    }

    /// A dictionary pre-loaded with the base-protocol (application id 0)
    /// AVPs and commands every node needs regardless of configuration.
    pub fn new_default() -> Dictionary {
        let dict = Dictionary::new();
        dict.load_xml(&DEFAULT_DICT_XML).expect("bundled base dictionary is well-formed");
        dict
    }

    pub fn insert_vendor(&self, id: u32, name: &str) -> Result<()> {
        let mut reg = self.registry.write().unwrap();
        if reg.vendors.contains_key(&id) {
            return Err(Error::AlreadyExists(format!("vendor {}", id)));
        }
        reg.vendors.insert(id, VendorEntry { id, name: name.to_string() });
        Ok(())
    }

    pub fn insert_application(&self, id: u32, name: &str) -> Result<()> {
        let mut reg = self.registry.write().unwrap();
        if reg.applications.contains_key(&id) {
            return Err(Error::AlreadyExists(format!("application {}", id)));
        }
        reg.applications.insert(id, ApplicationEntry { id, name: name.to_string() });
        Ok(())
    }

    pub fn insert_avp(&self, entry: AvpEntry) -> Result<()> {
        let mut reg = self.registry.write().unwrap();
        let key = (entry.code, entry.vendor_id);
        if reg.avps.contains_key(&key) {
            return Err(Error::AlreadyExists(format!("avp {:?}", key)));
        }
        if let Some(vendor_id) = entry.vendor_id {
            if !reg.vendors.contains_key(&vendor_id) {
                return Err(Error::InvalidArgument(format!(
                    "avp {} references unknown vendor {}",
                    entry.code, vendor_id
                )));
            }
        }
        reg.avps_by_name.insert(entry.name.clone(), key);
        reg.avps.insert(key, entry);
        Ok(())
    }

    pub fn insert_command(&self, entry: CommandEntry) -> Result<()> {
        let mut reg = self.registry.write().unwrap();
        if !reg.applications.contains_key(&entry.application_id) {
            return Err(Error::InvalidArgument(format!(
                "command {} references unknown application {}",
                entry.code, entry.application_id
            )));
        }
        let key = (entry.code, entry.application_id);
        if reg.commands.contains_key(&key) {
            return Err(Error::AlreadyExists(format!("command {:?}", key)));
        }
        reg.commands.insert(key, entry);
        Ok(())
    }

    /// Remove an application and every AVP/command defined under it.
    /// Vendor-defined AVPs that belong to other applications are untouched.
    pub fn remove_application(&self, id: u32) -> Result<()> {
        let mut reg = self.registry.write().unwrap();
        if reg.applications.remove(&id).is_none() {
            return Err(Error::NotFound(format!("application {}", id)));
        }
        reg.commands.retain(|(_, app_id), _| *app_id != id);
        Ok(())
    }

    pub fn avp_data_type(&self, code: u32, vendor_id: Option<u32>) -> Option<AvpDataType> {
        let reg = self.registry.read().unwrap();
        reg.avps.get(&(code, vendor_id)).map(|e| e.data_type)
    }

    pub fn avp_name(&self, code: u32, vendor_id: Option<u32>) -> Option<String> {
        let reg = self.registry.read().unwrap();
        reg.avps.get(&(code, vendor_id)).map(|e| e.name.clone())
    }

    pub fn avp_by_name(&self, name: &str) -> Option<(u32, Option<u32>)> {
        let reg = self.registry.read().unwrap();
        reg.avps_by_name.get(name).copied()
    }

    pub fn enum_val_name(&self, code: u32, vendor_id: Option<u32>, value: i32) -> Option<String> {
        let reg = self.registry.read().unwrap();
        reg.avps
            .get(&(code, vendor_id))
            .and_then(|e| e.enum_vals.iter().find(|v| v.code == value))
            .map(|v| v.name.clone())
    }

    pub fn command_name(&self, code: u32, application_id: u32) -> Option<String> {
        let reg = self.registry.read().unwrap();
        reg.commands.get(&(code, application_id)).map(|c| c.name.clone())
    }

    pub fn command_rules(&self, code: u32, application_id: u32, is_request: bool) -> Option<Vec<Rule>> {
        let reg = self.registry.read().unwrap();
        reg.commands.get(&(code, application_id)).map(|c| {
            if is_request {
                c.request_rules.clone()
            } else {
                c.answer_rules.clone()
            }
        })
    }

    pub fn has_application(&self, id: u32) -> bool {
        self.registry.read().unwrap().applications.contains_key(&id)
    }

    /// Load a dictionary XML document (the teacher's original `dictionary`
    /// sub-crate format) into this registry. Unknown data types fall back
    /// to `OctetString` rather than failing the whole load, matching the
    /// lenient behaviour `Avp::decode_from` needs for unrecognised AVPs.
    pub fn load_xml(&self, xml: &str) -> Result<()> {
        let doc: XmlDiameter = from_str(xml)
            .map_err(|e| Error::InvalidArgument(format!("malformed dictionary xml: {}", e)))?;

        let app_id: u32 = doc
            .application
            .id
            .parse()
            .map_err(|_| Error::InvalidArgument("application id not a u32".into()))?;

        if !self.has_application(app_id) {
            self.insert_application(app_id, &doc.application.name)?;
        }

        let mut by_name: HashMap<String, (u32, Option<u32>)> = HashMap::new();

        for avp in &doc.application.avps {
            let code: u32 = avp
                .code
                .parse()
                .map_err(|_| Error::InvalidArgument(format!("avp {} code not a u32", avp.name)))?;
            let vendor_id = match &avp.vendor_id {
                Some(v) => {
                    let v: u32 = v
                        .parse()
                        .map_err(|_| Error::InvalidArgument(format!("avp {} vendor id not a u32", avp.name)))?;
                    if !self.registry.read().unwrap().vendors.contains_key(&v) {
                        self.insert_vendor(v, "unknown")?;
                    }
                    Some(v)
                }
                None => None,
            };

            let enum_vals = avp
                .data
                .item
                .iter()
                .filter_map(|i| i.code.parse::<i32>().ok().map(|code| EnumVal { code, name: i.name.clone() }))
                .collect();

            by_name.insert(avp.name.clone(), (code, vendor_id));

            let entry = AvpEntry {
                code,
                vendor_id,
                name: avp.name.clone(),
                data_type: AvpDataType::from_xml_name(&avp.data.data_type),
                enum_vals,
            };
            match self.insert_avp(entry) {
                Ok(()) | Err(Error::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }

        if let Some(cmd) = &doc.application.command {
            let code: u32 = cmd
                .code
                .parse()
                .map_err(|_| Error::InvalidArgument("command code not a u32".into()))?;

            let resolve_rules = |rules: &[XmlRule]| -> Vec<Rule> {
                rules
                    .iter()
                    .filter_map(|r| {
                        by_name.get(&r.avp).map(|(code, vendor_id)| Rule {
                            avp_code: *code,
                            avp_vendor_id: *vendor_id,
                            position: if r.required == "true" {
                                RulePosition::Required
                            } else {
                                RulePosition::Optional
                            },
                            min: r.min.as_deref().and_then(|m| m.parse().ok()).unwrap_or(0),
                            max: r
                                .max
                                .as_deref()
                                .and_then(|m| m.parse().ok())
                                .unwrap_or(-1),
                        })
                    })
                    .collect()
            };

            let entry = CommandEntry {
                code,
                application_id: app_id,
                name: cmd.name.clone(),
                request_rules: resolve_rules(&cmd.request.rules),
                answer_rules: resolve_rules(&cmd.answer.rules),
            };
            match self.insert_command(entry) {
                Ok(()) | Err(Error::AlreadyExists(_)) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(())
    }
}

impl Default for Dictionary {
    fn default() -> Dictionary {
        Dictionary::new_default()
    }
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlDiameter {
    application: XmlApplication,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlApplication {
    id: String,
    name: String,
    command: Option<XmlCommand>,
    #[serde(rename = "avp", default)]
    avps: Vec<XmlAvp>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlCommand {
    code: String,
    name: String,
    request: XmlCommandDetail,
    answer: XmlCommandDetail,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlCommandDetail {
    #[serde(rename = "rule", default)]
    rules: Vec<XmlRule>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlRule {
    avp: String,
    required: String,
    max: Option<String>,
    min: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlAvp {
    name: String,
    code: String,
    #[serde(rename = "vendor-id")]
    vendor_id: Option<String>,
    data: XmlData,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlData {
    #[serde(rename = "type")]
    data_type: String,
    #[serde(default)]
    item: Vec<XmlItem>,
}

#[derive(Debug, Deserialize, PartialEq)]
struct XmlItem {
    code: String,
    name: String,
}

lazy_static! {
    static ref DEFAULT_DICT_XML: &'static str = r#"
<diameter>
    <application id="0" name="Base">
        <avp name="Session-Id" code="263">
            <data type="UTF8String"/>
        </avp>
        <avp name="Origin-Host" code="264">
            <data type="DiameterIdentity"/>
        </avp>
        <avp name="Origin-Realm" code="296">
            <data type="DiameterIdentity"/>
        </avp>
        <avp name="Destination-Host" code="293">
            <data type="DiameterIdentity"/>
        </avp>
        <avp name="Destination-Realm" code="283">
            <data type="DiameterIdentity"/>
        </avp>
        <avp name="Host-IP-Address" code="257">
            <data type="Address"/>
        </avp>
        <avp name="Vendor-Id" code="266">
            <data type="Unsigned32"/>
        </avp>
        <avp name="Product-Name" code="269">
            <data type="UTF8String"/>
        </avp>
        <avp name="Origin-State-Id" code="278">
            <data type="Unsigned32"/>
        </avp>
        <avp name="Supported-Vendor-Id" code="265">
            <data type="Unsigned32"/>
        </avp>
        <avp name="Auth-Application-Id" code="258">
            <data type="Unsigned32"/>
        </avp>
        <avp name="Acct-Application-Id" code="259">
            <data type="Unsigned32"/>
        </avp>
        <avp name="Vendor-Specific-Application-Id" code="260">
            <data type="Grouped"/>
        </avp>
        <avp name="Firmware-Revision" code="267">
            <data type="Unsigned32"/>
        </avp>
        <avp name="Result-Code" code="268">
            <data type="Unsigned32"/>
        </avp>
        <avp name="Error-Message" code="281">
            <data type="UTF8String"/>
        </avp>
        <avp name="Error-Reporting-Host" code="294">
            <data type="DiameterIdentity"/>
        </avp>
        <avp name="Failed-AVP" code="279">
            <data type="Grouped"/>
        </avp>
        <avp name="Route-Record" code="282">
            <data type="DiameterIdentity"/>
        </avp>
        <avp name="Proxy-Info" code="284">
            <data type="Grouped"/>
        </avp>
        <avp name="Proxy-Host" code="280">
            <data type="DiameterIdentity"/>
        </avp>
        <avp name="Proxy-State" code="33">
            <data type="OctetString"/>
        </avp>
        <avp name="Disconnect-Cause" code="273">
            <data type="Enumerated">
                <item code="0" name="REBOOTING"/>
                <item code="1" name="BUSY"/>
                <item code="2" name="DO_NOT_WANT_TO_TALK_TO_YOU"/>
            </data>
        </avp>
        <avp name="Inband-Security-Id" code="299">
            <data type="Unsigned32"/>
        </avp>
        <avp name="E2E-Sequence-AVP" code="300">
            <data type="Grouped"/>
        </avp>
        <avp name="Redirect-Host" code="292">
            <data type="DiameterURI"/>
        </avp>
        <avp name="Redirect-Host-Usage" code="261">
            <data type="Enumerated">
                <item code="0" name="DONT_CACHE"/>
                <item code="1" name="ALL_SESSION"/>
                <item code="2" name="ALL_REALM"/>
                <item code="3" name="REALM_AND_APPLICATION"/>
                <item code="4" name="ALL_APPLICATION"/>
                <item code="5" name="ALL_HOST"/>
                <item code="6" name="ALL_USER"/>
            </data>
        </avp>
        <avp name="Redirect-Max-Cache-Time" code="262">
            <data type="Unsigned32"/>
        </avp>
        <avp name="Session-Timeout" code="27">
            <data type="Unsigned32"/>
        </avp>
        <avp name="Authorization-Lifetime" code="291">
            <data type="Unsigned32"/>
        </avp>
        <avp name="Auth-Grace-Period" code="276">
            <data type="Unsigned32"/>
        </avp>
        <avp name="Re-Auth-Request-Type" code="285">
            <data type="Enumerated">
                <item code="0" name="AUTHORIZE_ONLY"/>
                <item code="1" name="AUTHORIZE_AUTHENTICATE"/>
            </data>
        </avp>
        <avp name="Class" code="25">
            <data type="OctetString"/>
        </avp>
        <avp name="Multi-Round-Time-Out" code="272">
            <data type="Unsigned32"/>
        </avp>
        <avp name="Termination-Cause" code="295">
            <data type="Enumerated"/>
        </avp>
        <avp name="User-Name" code="1">
            <data type="UTF8String"/>
        </avp>
        <avp name="Experimental-Result" code="297">
            <data type="Grouped"/>
        </avp>
        <avp name="Experimental-Result-Code" code="298">
            <data type="Unsigned32"/>
        </avp>
    </application>
</diameter>
"#;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_dict_resolves_base_avps() {
        let dict = Dictionary::new_default();
        assert_eq!(dict.avp_data_type(263, None), Some(AvpDataType::UTF8String));
        assert_eq!(dict.avp_data_type(264, None), Some(AvpDataType::DiameterIdentity));
        assert_eq!(dict.avp_data_type(268, None), Some(AvpDataType::Unsigned32));
        assert_eq!(dict.avp_data_type(999999, None), None);
    }

    #[test]
    fn test_insert_avp_rejects_duplicate() {
        let dict = Dictionary::new();
        let entry = AvpEntry {
            code: 1,
            vendor_id: None,
            name: "Foo".into(),
            data_type: AvpDataType::UTF8String,
            enum_vals: vec![],
        };
        dict.insert_avp(entry.clone()).unwrap();
        match dict.insert_avp(entry) {
            Err(Error::AlreadyExists(_)) => {}
            other => panic!("expected AlreadyExists, got {:?}", other),
        }
    }

    #[test]
    fn test_insert_avp_rejects_unknown_vendor() {
        let dict = Dictionary::new();
        let entry = AvpEntry {
            code: 1,
            vendor_id: Some(10415),
            name: "Foo".into(),
            data_type: AvpDataType::UTF8String,
            enum_vals: vec![],
        };
        match dict.insert_avp(entry) {
            Err(Error::InvalidArgument(_)) => {}
            other => panic!("expected InvalidArgument, got {:?}", other),
        }
    }

    #[test]
    fn test_remove_application_drops_its_commands() {
        let dict = Dictionary::new();
        dict.insert_application(16777251, "Test").unwrap();
        dict.insert_command(CommandEntry {
            code: 272,
            application_id: 16777251,
            name: "Credit-Control".into(),
            request_rules: vec![],
            answer_rules: vec![],
        })
        .unwrap();
        dict.remove_application(16777251).unwrap();
        assert!(dict.command_rules(272, 16777251, true).is_none());
    }
}
