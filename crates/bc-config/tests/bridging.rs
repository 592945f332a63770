mod common;

use bc_config::BuildSettings;
use bc_types::ErrorClass;
use common::*;
use serde_json::json;

#[test]
fn client_facing_external_core_runs_full_bridge() {
    let f = fixture(db(vec![naive(1, "n.example")]), settings_with_core());
    let out = f.builder.build_config(&f.profile(1), false, false, 0).unwrap();
    let doc = &out.document;

    assert!(out.keep_vpn_off);
    assert_eq!(
        doc["outbounds"][0],
        json!({"type": "socks", "server": "127.0.0.1", "server_port": 30001, "tag": "proxy"})
    );
    // no redirect inbound in full mode
    assert_eq!(tags(doc, "inbounds"), vec!["mixed-in"]);
    assert!(out.chain_rules.is_empty());

    assert_eq!(out.externals.len(), 1);
    let ext = &out.externals[0];
    assert_eq!(ext.tag, "naive");
    assert_eq!(ext.program, "/opt/naive");
    assert_eq!(ext.arguments[0], "--listen=socks://127.0.0.1:30001");
    assert_eq!(ext.config.as_deref(), Some("{\"proxy\": \"https://n.example:443\"}"));
}

#[test]
fn inner_external_core_is_mapped_and_routed() {
    // chain list is innermost first: the external core is the far hop
    let f = fixture(
        db(vec![socks(1, 0), naive(2, "n.example"), chain(10, &[1, 2])]),
        settings_with_core(),
    );
    let out = f.builder.build_config(&f.profile(10), false, false, 0).unwrap();
    let doc = &out.document;

    assert!(!out.keep_vpn_off);
    assert_eq!(tags(doc, "inbounds"), vec!["mixed-in", "proxy-mapping"]);
    let mapping = &doc["inbounds"][1];
    assert_eq!(mapping["type"], "direct");
    assert_eq!(mapping["listen"], "127.0.0.1");
    assert_eq!(mapping["listen_port"], 30000);
    assert_eq!(mapping["override_address"], "n.example");
    assert_eq!(mapping["override_port"], 443);

    assert_eq!(doc["outbounds"][0]["server_port"], 30001);
    assert!(doc["outbounds"][0].get("detour").is_none());
    assert_eq!(doc["outbounds"][1]["tag"], "g-1-1");

    let rule = json!({"inbound": ["proxy-mapping"], "outbound": "g-1-1"});
    assert_eq!(out.chain_rules, vec![rule.clone()]);
    assert_eq!(doc["route"]["rules"][0], rule);
    assert_eq!(out.externals[0].config.as_deref(), Some("{\"proxy\": \"https://127.0.0.1:30000\"}"));
}

#[test]
fn vpn_mode_maps_the_entry_hop_to_direct() {
    let mut s = settings_with_core();
    s.vpn.enabled = true;
    let f = fixture(db(vec![naive(1, "n.example")]), s);
    let out = f.builder.build_config(&f.profile(1), false, false, 0).unwrap();

    assert!(!out.keep_vpn_off);
    assert_eq!(
        out.chain_rules,
        vec![json!({"inbound": ["proxy-mapping"], "outbound": "direct"})]
    );
    assert_eq!(
        tags(&out.document, "inbounds"),
        vec!["mixed-in", "tun-in", "proxy-mapping"]
    );
}

#[test]
fn fixed_bridge_ports_are_reused() {
    let mut p = naive(1, "n.example");
    p["bean"]["mapping_port"] = json!(40000);
    p["bean"]["socks_port"] = json!(40001);
    let mut s = settings_with_core();
    s.vpn.enabled = true;
    let f = fixture(db(vec![p]), s);
    let out = f.builder.build_config(&f.profile(1), false, false, 0).unwrap();
    assert_eq!(out.document["outbounds"][0]["server_port"], 40001);
    let mapping = &out.document["inbounds"][2];
    assert_eq!(mapping["listen_port"], 40000);
}

#[test]
fn missing_launcher_is_core_not_found() {
    let f = fixture(db(vec![naive(1, "n.example")]), BuildSettings::default());
    let err = f.builder.build_config(&f.profile(1), false, false, 0).unwrap_err();
    assert_eq!(err.to_string(), "Core not found: naive");
    assert_eq!(err.class(), ErrorClass::Resource);
}

#[test]
fn mapping_without_server_cannot_be_bridged() {
    let f = fixture(
        db(vec![socks(1, 0), naive(2, ""), chain(10, &[1, 2])]),
        settings_with_core(),
    );
    let err = f.builder.build_config(&f.profile(10), false, false, 0).unwrap_err();
    assert_eq!(
        err.to_string(),
        "This configuration cannot be set automatically, please try another."
    );
    assert_eq!(err.class(), ErrorClass::Capability);
}

#[test]
fn bean_rejection_surfaces_verbatim() {
    let p = json!({
        "id": 1,
        "gid": 0,
        "bean": {"type": "tuic", "server": "t.example", "server_port": 443, "uuid": "u", "congestion_control": "reno"}
    });
    let f = fixture(db(vec![p]), BuildSettings::default());
    let err = f.builder.build_config(&f.profile(1), false, false, 0).unwrap_err();
    assert_eq!(err.to_string(), "unsupported tuic congestion control: reno");
    assert_eq!(err.class(), ErrorClass::Policy);
}

#[test]
fn multiplex_is_attached_to_native_hops() {
    let p = json!({
        "id": 1,
        "gid": 0,
        "enable_brutal": true,
        "brutal_speed": 50,
        "bean": {"type": "trojan", "server": "t.example", "server_port": 443, "password": "pw",
                 "stream": {"security": "tls", "sni": "t.example"}}
    });
    let f = fixture(db(vec![p]), BuildSettings::default());
    let out = f.builder.build_config(&f.profile(1), false, false, 0).unwrap();
    let ob = &out.document["outbounds"][0];
    assert_eq!(ob["multiplex"]["enabled"], true);
    assert_eq!(ob["multiplex"]["max_connections"], 1);
    assert_eq!(ob["multiplex"]["brutal"]["down_mbps"], 50);
    assert_eq!(ob["tls"]["server_name"], "t.example");
}

#[test]
fn helper_programs_are_listed_for_tun_bypass() {
    let mut s = settings_with_core();
    s.extra_cores.insert("naive".into(), r"C:\cores\naive.exe".into());
    let f = fixture(db(vec![naive(1, "n.example")]), s);
    let out = f.builder.build_config(&f.profile(1), false, false, 0).unwrap();
    assert_eq!(out.auto_bypass_paths(), vec!["C:/cores/naive.exe"]);

    let f = fixture(db(vec![socks(1, 0)]), BuildSettings::default());
    let out = f.builder.build_config(&f.profile(1), false, false, 0).unwrap();
    assert!(out.auto_bypass_paths().is_empty());
}
