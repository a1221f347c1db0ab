use super::*;
use crate::mesh::config::TrafficConfig;
use crate::mesh::MeshModel;
use crate::ncm::{connect, NcmConfig, NocDomain, RegisterFrontEnd};

/// Client, front end and NoC domain on one shared clock.
struct Rig {
    client: ControlClient,
    fe: RegisterFrontEnd,
    noc: NocDomain<MeshModel>,
}

fn rig() -> Rig {
    let mesh = MeshConfig::default();
    let topo = Arc::new(Topology::new(&mesh).unwrap());
    let ncm = Arc::new(NcmConfig { mesh, ..NcmConfig::default() });
    let (host, fe_ports, noc_ports) = connect(16);
    let traffic = TrafficConfig { be_rate: 0.0, ..TrafficConfig::default() };
    let fabric = MeshModel::new(Arc::new(traffic), topo.clone());
    Rig {
        client: ControlClient::new(Arc::new(ClientConfig::default()), HostPort::new(host)),
        fe: RegisterFrontEnd::new(ncm.clone(), topo.clone(), fe_ports),
        noc: NocDomain::new(ncm, topo, fabric, noc_ports),
    }
}

impl Rig {
    fn run(&mut self, cycles: usize) {
        for _ in 0..cycles {
            self.client.tick_one();
            self.fe.tick_one();
            self.noc.tick_one();
        }
    }

    /// Runs until the client has nothing in flight, then lets the last command drain.
    fn settle(&mut self) {
        let mut budget = 5000;
        while !self.client.idle() && budget > 0 {
            self.run(1);
            budget -= 1;
        }
        assert!(budget > 0, "client never went idle");
        self.run(50);
    }

    fn ready() -> Rig {
        let mut r = rig();
        r.settle();
        assert!(r.client.ready());
        r
    }
}

#[test]
fn reads_layout_and_claims_events() {
    let r = Rig::ready();
    let layout = r.client.layout().unwrap();
    assert_eq!((3, 3), (layout.topology.x_dim(), layout.topology.y_dim()));
    assert_eq!(16, layout.topology.lut_size());
    assert_eq!(2, layout.max_ports);
    assert_eq!(Some(1), r.client.register(REG_EVENT_DEST));
    assert_eq!(1, r.fe.registers().event_dest());
    assert_eq!(0, r.client.stats().register_errors);
}

#[test]
fn failed_register_access_is_counted() {
    let mut r = Rig::ready();
    r.client.read_register(0x0100);
    r.client.write_register(REG_VENDOR, 9);
    r.settle();
    assert_eq!(2, r.client.stats().register_errors);
    assert_eq!(None, r.client.register(0x0100));
    assert_eq!(None, r.client.register(REG_VENDOR));
}

#[test]
fn nothing_is_reserved_before_the_layout_is_known() {
    let mut r = rig();
    assert_eq!(Err(TdmError::NotReady), r.client.create_tdm_channel(0, 8, 1, true));
    assert_eq!(Err(TdmError::NotReady), r.client.configure_tdm_path_raw(&[0, 1], 0, 0, 0, 0));
}

#[test]
fn raw_path_programs_every_table() {
    let mut r = Rig::ready();
    r.client.configure_tdm_path_raw(&[0, 1, 4], 3, 0, 1, 0).unwrap();
    r.settle();
    let mesh = r.noc.fabric();
    assert_eq!(Some(1), mesh.read_ni_slot(0, 0, 3));
    assert_eq!(Some(4), mesh.read_router_slot(0, 1, 3));
    assert_eq!(Some(3), mesh.read_router_slot(1, 2, 4));
    assert_eq!(Some(0), mesh.read_router_slot(4, 4, 5));
    assert_eq!(Some(0), mesh.read_ni_slot(4, 2, 6));
    assert!(mesh.link_enabled(0, 1, 0));
    assert_eq!(
        Err(TdmError::NoPath { src: 0, dest: 4 }),
        r.client.configure_tdm_path_raw(&[0, 4], 0, 0, 0, 0)
    );
}

#[test]
fn channel_gets_two_disjoint_paths() {
    let mut r = Rig::ready();
    assert_eq!(Ok(0), r.client.create_tdm_channel(0, 8, 1, true));
    r.settle();
    let channels = r.client.channels();
    assert_eq!(1, channels.len());
    assert_eq!(vec![0, 1, 2, 5, 8], channels[0].paths[0].path);
    assert_eq!(vec![0, 3, 6, 7, 8], channels[0].paths[1].path);

    let mesh = r.noc.fabric();
    // first hops: east on link 0, south on link 1, both in slot 0
    assert_eq!(Some(4), mesh.read_router_slot(0, 1, 0));
    assert_eq!(Some(5), mesh.read_router_slot(0, 2, 0));
    assert!(mesh.link_enabled(0, 0, 0));
    assert!(mesh.link_enabled(0, 0, 1));
    assert_eq!(Some(1), r.client.tdm().unwrap().free_endpoint(0, EndpointDir::Out));
}

#[test]
fn deleting_a_channel_releases_tables_and_endpoints() {
    let mut r = Rig::ready();
    let chid = r.client.create_tdm_channel(0, 8, 2, true).unwrap();
    r.settle();
    r.client.delete_tdm_channel(chid).unwrap();
    r.settle();
    let mesh = r.noc.fabric();
    assert_eq!(Some(EMPTY_SLOT), mesh.read_router_slot(0, 1, 0));
    assert_eq!(Some(EMPTY_SLOT), mesh.read_router_slot(0, 1, 1));
    assert!(!mesh.link_enabled(0, 0, 0));
    assert!(r.client.channels().is_empty());
    assert_eq!(Some(0), r.client.tdm().unwrap().free_endpoint(0, EndpointDir::Out));
    assert_eq!(Err(TdmError::UnknownChannel(chid)), r.client.delete_tdm_channel(chid));
}

#[test]
fn manual_paths_are_checked() {
    let mut r = Rig::ready();
    let chid = r.client.create_tdm_channel(0, 8, 1, false).unwrap();
    r.client.add_path_to_channel(chid, 0, vec![0, 1, 2, 5, 8]).unwrap();
    assert_eq!(
        Err(TdmError::PathIndexTaken(0)),
        r.client.add_path_to_channel(chid, 0, vec![0, 3, 6, 7, 8])
    );
    // shares the 0 -> 1 hop
    assert_eq!(
        Err(TdmError::NotDisjoint),
        r.client.add_path_to_channel(chid, 1, vec![0, 1, 4, 5, 8])
    );
    assert_eq!(
        Err(TdmError::NoPath { src: 0, dest: 8 }),
        r.client.add_path_to_channel(chid, 1, vec![0, 3, 6, 7])
    );
    r.client.add_path_to_channel(chid, 1, vec![0, 3, 6, 7, 8]).unwrap();
    r.client.remove_path_from_channel(chid, 1).unwrap();
    assert_eq!(Err(TdmError::NoPathAtIndex(1)), r.client.remove_path_from_channel(chid, 1));
    assert_eq!(Err(TdmError::UnknownChannel(7)), r.client.add_path_to_channel(7, 0, vec![0, 1]));
    r.settle();
    assert_eq!(1, r.client.channels()[0].paths.len());
}

#[test]
fn endpoints_run_out() {
    let mut r = Rig::ready();
    r.client.create_tdm_channel(0, 8, 1, false).unwrap();
    r.client.create_tdm_channel(0, 7, 1, false).unwrap();
    assert_eq!(Err(TdmError::NoFreeEndpoint(0)), r.client.create_tdm_channel(0, 6, 1, false));
}

#[test]
fn injected_fault_comes_back_as_a_report() {
    let mut r = Rig::ready();
    let chid = r.client.create_tdm_channel(3, 5, 1, true).unwrap();
    r.client.activate_monitoring(50);
    r.settle();
    assert_eq!(Some(CS_ACTIVE), r.client.register(REG_CS));

    // east link of node 4 carries the X-Y path 3 -> 4 -> 5
    r.client.configure_fault(4, 1, true);
    r.settle();
    r.run(200);
    assert_eq!(&[0, 0, 0, 0, 0x02, 0, 0, 0, 0], r.client.fault_vector());
    assert_eq!(0x02, r.client.events().unwrap().faults()[4]);
    let channel = &r.client.channels()[chid].channel;
    assert_eq!([true, false], channel.errors);

    r.client.reset_faults();
    r.client.deactivate_monitoring();
    r.settle();
    assert_eq!(0, r.noc.fabric().fault_inject(4));
    assert_eq!(Some(0), r.client.register(REG_CS));
}
