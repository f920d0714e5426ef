//! Performance benchmarks for the wire codec and group operations

use server::config::GroupConfig;
use server::directory::InMemoryDirectory;
use server::dispatcher::Dispatcher;
use server::loot::LogResolver;
use server::persistence::LogPersistence;
use server::registry::GroupRegistry;
use server::service::GroupService;
use shared::{
    ClientCommand, GroupKind, ItemQuality, LootMethod, MemberFlags, MemberStats, MemberStatus, ObjectGuid,
    PlayerProfile, Roles, RosterEntry, RosterUpdate, ServerEvent, Team,
};
use std::sync::Arc;
use std::time::Instant;

fn full_raid_roster() -> RosterUpdate {
    let members = (1..40u64)
        .map(|i| RosterEntry {
            guid: ObjectGuid(0x0100 + i),
            name: format!("Raider{}", i),
            online: i % 3 != 0,
            sub_group: (i / 5) as u8,
            flags: if i == 1 { MemberFlags::ASSISTANT } else { MemberFlags::empty() },
            roles: Roles::DAMAGE,
        })
        .collect();
    RosterUpdate {
        group: ObjectGuid::group(42),
        leader: ObjectGuid(0x0100),
        kind: GroupKind::Raid,
        own_sub_group: 0,
        own_flags: MemberFlags::empty(),
        counter: 7,
        loot_method: LootMethod::MasterLoot,
        looter: ObjectGuid(0x0100),
        loot_threshold: ItemQuality::Epic,
        members,
    }
}

/// Benchmarks encoding and decoding a forty-player roster
#[test]
fn benchmark_roster_codec() {
    let event = ServerEvent::Roster(full_raid_roster());
    let iterations = 10_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let packet = event.encode().unwrap();
        let decoded = ServerEvent::decode(&packet).unwrap();
        assert!(matches!(decoded, ServerEvent::Roster(_)));
    }

    let duration = start.elapsed();
    println!(
        "Roster codec: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    // Should complete in under 2 seconds
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks decoding of small, frequent client commands
#[test]
fn benchmark_command_decode() {
    let packets: Vec<_> = [
        ClientCommand::SetLeader {
            target: ObjectGuid(0x0102),
        },
        ClientCommand::ConfirmReadyCheck {
            group: ObjectGuid::group(9),
            ready: true,
        },
        ClientCommand::RandomRoll { min: 1, max: 100 },
        ClientCommand::MinimapPing { x: 12.5, y: -40.0 },
    ]
    .iter()
    .map(|command| command.encode().unwrap())
    .collect();

    let iterations = 100_000;
    let start = Instant::now();

    for i in 0..iterations {
        let _ = ClientCommand::decode(&packets[i % packets.len()]).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Command decode: {} iterations in {:?} ({:.2} ns/iter)",
        iterations,
        duration,
        duration.as_nanos() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 1000);
}

/// Benchmarks the full member stats block with auras and a pet
#[test]
fn benchmark_member_stats_codec() {
    let stats = MemberStats {
        guid: ObjectGuid(0x0100),
        status: MemberStatus::ONLINE | MemberStatus::PVP,
        health: 25_000,
        max_health: 30_000,
        power: 1_200,
        max_power: 2_000,
        level: 85,
        zone: 1519,
        position: [100, 200, 30],
        ..MemberStats::default()
    };
    let event = ServerEvent::MemberStats(stats);
    let iterations = 50_000;
    let start = Instant::now();

    for _ in 0..iterations {
        let packet = event.encode().unwrap();
        let _ = ServerEvent::decode(&packet).unwrap();
    }

    let duration = start.elapsed();
    println!(
        "Member stats codec: {} iterations in {:?} ({:.2} μs/iter)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert!(duration.as_millis() < 2000);
}

/// Stress test forming and dissolving many groups through the service
#[tokio::test]
async fn stress_test_group_churn() {
    let directory = Arc::new(InMemoryDirectory::new());
    let (dispatcher, mut outbound) = Dispatcher::new();
    let registry = Arc::new(GroupRegistry::new(Arc::new(LogPersistence)));
    let service = GroupService::new(
        registry,
        directory.clone(),
        dispatcher,
        Arc::new(LogResolver),
        GroupConfig::default(),
    );

    let pairs = 500;
    let players: Vec<(ObjectGuid, ObjectGuid, String)> = (0..pairs)
        .map(|i| {
            let leader_name = format!("Lead{}", alpha(i));
            let member_name = format!("Mem{}", alpha(i));
            let leader = directory
                .login(PlayerProfile::new(leader_name, Team::Horde))
                .unwrap();
            let member = directory
                .login(PlayerProfile::new(member_name.clone(), Team::Horde))
                .unwrap();
            (leader, member, member_name)
        })
        .collect();

    let start = Instant::now();

    for (leader, member, member_name) in &players {
        service
            .execute(
                *leader,
                ClientCommand::Invite {
                    name: member_name.clone(),
                    realm: String::new(),
                    cross_realm: ObjectGuid::EMPTY,
                },
            )
            .await;
        service
            .execute(*member, ClientCommand::InviteResponse { accept: true })
            .await;
    }
    assert_eq!(service.registry().group_count(), pairs);

    for (leader, _, _) in &players {
        service.execute(*leader, ClientCommand::Disband).await;
    }
    assert_eq!(service.registry().group_count(), 0);

    let duration = start.elapsed();
    let mut delivered = 0;
    while outbound.try_recv().is_ok() {
        delivered += 1;
    }
    println!(
        "Group churn: {} groups formed and disbanded in {:?}, {} packets queued",
        pairs, duration, delivered
    );

    // Should complete in under 5 seconds
    assert!(duration.as_secs() < 5);
}

/// Player names may only hold letters.
fn alpha(mut n: usize) -> String {
    let mut out = String::new();
    loop {
        out.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
        if n == 0 {
            return out;
        }
    }
}
