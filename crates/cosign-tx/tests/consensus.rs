//! Signed transactions checked by libbitcoinconsensus.
//!
//! The fixed vectors come from a regtest wallet: the cosigner material was
//! produced by the server against the session ids listed here.

use std::str::FromStr;
use std::sync::Mutex;

use bitcoin::consensus::deserialize;
use bitcoin::hashes::Hash;
use bitcoin::secp256k1::{Message, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, Prevouts, SighashCache, TapSighashType};
use bitcoin::transaction::Version;
use bitcoin::{
    absolute, Amount, Network, OutPoint, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid,
    Witness,
};
use cosign_core::{ExtendedPrivateKey, ExtendedPublicKey};
use cosign_musig::{compute_cosigner_partial_signature, MusigTweaks, MusigVersion, SessionId};
use cosign_tx::scripts::multisig_script;
use cosign_tx::{
    create_address, AddressVersion, IncomingSwapData, Input, InvoiceSecrets, MemoryInvoiceStore,
    MuunAddress, MusigNonces, Outpoint, PartiallySignedTransaction, SignError, SignedTransaction,
    SigningContext, SigningExpectations, SphinxError, SphinxValidator, SubmarineSwapV1Data,
    SubmarineSwapV2Data, UnavailableSphinxValidator,
};

const BASE_PATH: &str = "m/schema:1'/recovery:1'";

fn bytes(hex_str: &str) -> Vec<u8> {
    hex::decode(hex_str).unwrap()
}

fn prevout(raw_tx: &str, index: u32) -> TxOut {
    let tx: Transaction = deserialize(&bytes(raw_tx)).unwrap();
    tx.output[index as usize].clone()
}

fn input(txid: &str, index: u32, amount: u64, version: AddressVersion, path: &str, address: &str) -> Input {
    Input::new(
        Outpoint {
            txid: Txid::from_str(txid).unwrap(),
            index,
            amount: Amount::from_sat(amount),
        },
        MuunAddress::new(version, path, address),
    )
}

fn fixed_sessions(ids: &[&str]) -> MusigNonces {
    MusigNonces::from_fixed_session_ids(
        ids.iter()
            .map(|id| SessionId::from_bytes(bytes(id).try_into().unwrap()))
            .collect(),
    )
}

fn user_key(encoded: &str, path: &str) -> ExtendedPrivateKey {
    ExtendedPrivateKey::from_base58(encoded, path, Network::Regtest).unwrap()
}

fn muun_key(encoded: &str, path: &str) -> ExtendedPublicKey {
    ExtendedPublicKey::from_base58(encoded, path, Network::Regtest).unwrap()
}

/// Consensus-verify one input against every spent output.
fn consensus_verify(tx_bytes: &[u8], spent_outputs: &[TxOut], input_index: usize) {
    let txout = &spent_outputs[input_index];

    let all_utxos: Vec<bitcoinconsensus::Utxo> = spent_outputs
        .iter()
        .map(|o| {
            let sb = o.script_pubkey.as_bytes();
            bitcoinconsensus::Utxo {
                script_pubkey: sb.as_ptr(),
                script_pubkey_len: sb.len() as u32,
                value: o.value.to_sat() as i64,
            }
        })
        .collect();

    let result = bitcoinconsensus::verify(
        txout.script_pubkey.as_bytes(),
        txout.value.to_sat(),
        tx_bytes,
        Some(&all_utxos),
        input_index,
    );

    assert!(
        result.is_ok(),
        "consensus verification failed for input {}: {:?}",
        input_index,
        result.err()
    );
}

fn verify_all_inputs(signed: &SignedTransaction, spent_outputs: &[TxOut]) {
    let tx: Transaction = deserialize(&signed.bytes).unwrap();
    assert_eq!(tx.compute_txid(), signed.hash);
    assert_eq!(tx.input.len(), spent_outputs.len());
    for index in 0..spent_outputs.len() {
        consensus_verify(&signed.bytes, spent_outputs, index);
    }
}

/// Sign with no invoices and no onion decoder.
fn sign(pst: &PartiallySignedTransaction, user: &ExtendedPrivateKey, muun: &ExtendedPublicKey) -> SignedTransaction {
    let store = MemoryInvoiceStore::new();
    let sphinx = UnavailableSphinxValidator;
    let ctx = SigningContext::new(Network::Regtest, &store, &sphinx);
    pst.sign(user, muun, &ctx).unwrap()
}

#[test]
fn test_sign_v1() {
    let tx = "0100000001706bcabdcdcfd519bdb4534f8ace9f8a3cd614e7b00f074cce0a58913eadfffb0100000000ffffffff022cf46905000000001976a914072b22dfb34153d4e084dce8c6655430d37f12d088aca4de8b00000000001976a914fded0987447ef3273cde87bf8b65a11d1fd9caca88ac00000000";
    let user = user_key("tprv8eJiUjHpVRyTUM1p4XDRUdRZPJLfud22swAv48my1MxaCZztUNRrWxmN6ycdd9a2xfJwLchq5jW9m2jkNpwruijwvygCv41e6YrsqUvw7hQ", BASE_PATH);

    let inputs = vec![input(
        "fbffad3e91580ace4c070fb0e714d63c8a9fce8a4f53b4bd19d5cfcdbdca6b70",
        1,
        100_000_000,
        AddressVersion::V1,
        "m/schema:1'/recovery:1'/external:1/1",
        "n4fbDDpmfZgyjHsp93C5z7rd68Wq5kS2tj",
    )];
    let pst = PartiallySignedTransaction::from_hex(tx, inputs, MusigNonces::generate(1)).unwrap();

    // V1 never looks at the cosigner key
    let signed = sign(&pst, &user, &user.public_key());
    verify_all_inputs(&signed, &[prevout(tx, 1)]);
}

#[test]
fn test_sign_v2() {
    let user = user_key("tprv8dfM4H5fYJirMai5Er3LguicgUAyxmcSQbFub5ens16amX1e1HAFiW4SXnFVw9nu9FedFQqTPGTTjPEmgfvvXMKww3UcRpFbbC4DFjbCcTb", BASE_PATH);
    let muun = muun_key("tpubDBYMnFoxYLdMBZThTk4uARTe4kGPeEYWdKcaEzaUxt1cesetnxtTqmAxVkzDRou51emWytommyLWcF91SdF5KecA6Ja8oHK1FF7d5U2hMxX", BASE_PATH);
    let path = "m/schema:1'/recovery:1'/external:1/0";
    let address = "2NDeWrsJEwvxwVnvtWzPjhDC5B2LYkFuX2s";

    let prev = [
        ("721b51af45201e2a288c05e09b958b11ec1034ba46035eef2b620a06235dc1f3", "0200000001020678c852c6d943cf0d3a9b5102b1a4e2ebccdb4ca2eaae7731c8f59b81172a000000004847304402204a3958c1bd6abcd7b5ec2291bd43391dcfe757068ff0e340dd8f502cb25435b0022076e865730e49e4d126b94675d276545e35afa84feea2873bb5f923b842d90f4801feffffff0224bf45220000000017a914cb81f4e1ff68249e6f4f17a7995007b5a478705b8780f0fa020000000017a914dfca2abd2bb72cf911940a9d16de126cc1cd60368794020000", 1, "3045022100d07028674c49d8dabc536db47f1371c2f61fc578cb2c8797a570e3176f5e91c902206a83db8ad5b63e88c48d0ae4e67646fcf6e33d0177a88996c15b280494885e7b01"),
        ("4ab727263a5eb78c47e90833f26ab566fe484b16f64c16d0f7452e70a053acb8", "0200000001ff3f3b16506ef957b9ea80287f276ee415380597a4ede7ae45fff6e18d3e13d8000000004847304402204dbe876d7f0761a72ecc2d0e0e45c1ab32d6bd69d5062068984e26af02c4b27102202f2bd18a17821bdce155b13ea2c379bb78c9157f7f44e2e6a8cef1a154ec68ac01feffffff0224bf45220000000017a914684830d4ef58c54b6b3db6b4a3eb7818d418ae258780f0fa020000000017a914dfca2abd2bb72cf911940a9d16de126cc1cd60368794020000", 1, "304402201b0c35179a5fa8e6255115450979a77dbb97d89157e236783df0312a5d7bdb2c022064bae7ad0cdc72e4339421067cc65e0c3d03690a5c2d98c32a6ef67f883558a001"),
        ("9b6f09ce344f12c68e3cd7ca0ba2e6cdbd2ac17f00309c709fb27fb096dc544e", "02000000019fdde3b7eb40584d103a04dd253ffa0ceb458776db56fbee6489aee0d34402d6000000004847304402206abfb750561acac1be3d6ec3eabc1c88ac7ce11f28f5c8162428ce78dabb4d8e0220753c03bf8b9af9c9bf592f52586d39d8aa10c1111f105fea0ce0cf5c82a4574101feffffff0280f0fa020000000017a914dfca2abd2bb72cf911940a9d16de126cc1cd60368724bf45220000000017a9148d7814264268f1f0f98870f95dc69017bd0cce708794020000", 0, "30440220076b14b1c906089546cb40ce05dab38f0388ca65d0bc5183d3c3f7dcb98be52c022001eea4635d56726d990daa92ac26c52c9030c96dddcc92e5d623546580aaaef401"),
        ("a4d88169a7b548a2a22af9a7b3ff25da3d0c7d6ed27f52a4ba488e4a28c4114c", "02000000019d657207178c19bb4fd45de6a5f83caadf86bd7519e1569c8daf078a46e565310000000048473044022033c864f4a6ab42ba29d09bb2dd110e55a3c4118fd0a68cbe5c461926cc64d3e9022029a5b57a2a6e24e6f66f4354b74d7ffc7affa6d43843797faa70c84ec47b7b8501feffffff0280f0fa020000000017a914dfca2abd2bb72cf911940a9d16de126cc1cd60368724bf45220000000017a914b392913e36a7017404c60424da4ebb48a53b5bb18794020000", 0, "30440220145dcce0bf6cceda98b3a9635bd7611d92085ff3ad27690bcf471a6b39620e6c02205ca0a0bd93550e86468e236b291457a3ff84a3b5dedeb10067cc9d3233b5dafa01"),
    ];
    let inputs = prev
        .iter()
        .map(|(txid, _, index, sig)| {
            input(txid, *index, 50_000_000, AddressVersion::V2, path, address).with_muun_signature(bytes(sig))
        })
        .collect();
    let spent: Vec<TxOut> = prev.iter().map(|(_, raw, index, _)| prevout(raw, *index)).collect();

    let pst = PartiallySignedTransaction::from_hex("0100000004f3c15d23060a622bef5e0346ba3410ec118b959be0058c282a1e2045af511b720100000000ffffffffb8ac53a0702e45f7d0164cf6164b48fe66b56af23308e9478cb75e3a2627b74a0100000000ffffffff4e54dc96b07fb29f709c30007fc12abdcde6a20bcad73c8ec6124f34ce096f9b0000000000ffffffff4c11c4284a8e48baa4527fd26e7d0c3dda25ffb3a7f92aa2a248b5a76981d8a40000000000ffffffff01a9cbea0b0000000017a914dfca2abd2bb72cf911940a9d16de126cc1cd60368700000000", inputs, MusigNonces::generate(4)).unwrap();
    verify_all_inputs(&sign(&pst, &user, &muun), &spent);
}

#[test]
fn test_sign_v3() {
    let user = user_key("tprv8ezdJAiJTZz4BJo1VysKviVqto1f8CAS3d2M9LWZ5oygiMrtb6NYcPnkWTcdP8b2AuKVVegnWe3Czzo7geDqH2MzXvzDu1SiKucVAG6KFvE", BASE_PATH);
    let muun = muun_key("tpubDABPYHYrYQHXY2pYFdcsFd41aE2uZmMQZpRRGiKfgz7G7nU7PoSwrzMKeHHnoMjmn9woC87coUanF2T911R8X5HpUtZRJRf56u4r51gTrqD", BASE_PATH);

    let inputs = vec![input(
        "0497d07c263890163da26914c11255b6f6ef7d9fdc75b6bfe999994118a74c4a",
        1,
        1_500_000_000,
        AddressVersion::V3,
        "m/schema:1'/recovery:1'/external:1/0",
        "2MwArDxm83HCWKvoLKcKAg1Nv6ZG7fWYzMa",
    )
    .with_muun_signature(bytes("3045022100d138caf8d3c19db84363b33e1ad002e1aee7907302ab5110edaf78d980c94e48022019e841da8759f63596fbcd81a3544219573288877206f8f651cae1023c397f0c01"))];

    let pst = PartiallySignedTransaction::from_hex("01000000014a4ca718419999e9bfb675dc9f7deff6b65512c11469a23d169038267cd097040100000000ffffffff02916067590000000017a91437a2fceeb0c454b22b427c34eb565d8b1dc953ed8797c400000000000017a9142b0cabe5d058bc3c58f8a656dec2601d117262538700000000", inputs, MusigNonces::generate(1)).unwrap();
    verify_all_inputs(&sign(&pst, &user, &muun), &[prevout("02000000014f1e7a952c72670bf03a040faa183687ec8c9e0fb7adf606d1ce13395fb663000000000017160014a89e2ded102b2dde96e8bc87219113c6d31a1fe4feffffff02240e5ea9cf00000017a9142773c1a1651ad774f4b867d955ae8b816ac806ad87002f68590000000017a9142b0cabe5d058bc3c58f8a656dec2601d117262538736010000", 1)]);
}

#[test]
fn test_sign_v5() {
    let user = user_key("tprv8e6WDju7yhq6vuL8raFiMpCMVYpNEpjggzqcX3qW4zsjNBVnwKgAUmQ7vs7bDeHu598aG9teh7or5H8ifLJ2qhZGocBnDEBqAsTs3Gd6wG6", BASE_PATH);
    let muun = muun_key("tpubDBS2rf9CeryjGstPrQVSzQhLGLqFVqEq78xtK26h9fsN7udiokAMuu6DbSzwhSzqCwszcfC2L2zMYoFm9uoiJpkEwyUCuNr3j1XswbHcgAB", BASE_PATH);

    let inputs = vec![input(
        "45035ee77a25e5b1cb5b3a91dbe80d37db77cc6c14bbb054979812125dc69f23",
        1,
        100_000,
        AddressVersion::V5,
        "m/schema:1'/recovery:1'/external:1/0",
        "bcrt1pdq20qkqn6fg9lq8vtfcu5mammxwl82k9urkn55r2rsmkh66gf6gsumc8uw",
    )
    .with_muun_partial_signature(bytes("02b44aef04d3ada7270e1304f4ba1fbf20cca0ca81a80e23be9bf8f3aea7c0a62103f6c8cd699fc2339a33df60f142bb89807c081632a2241bd4af583961a29da9a0"), bytes("591f2e7afd46a8b234e94428e582f13324cd541d436bde62cef760354771a377"))];
    let nonces = fixed_sessions(&["3afcd7f2cc568aa60552866f7ee8d1de6a6b18293ae9a4cda167434588267f73"]);

    let pst = PartiallySignedTransaction::from_hex("0100000001239fc65d1212989754b0bb146ccc77db370de8db913a5bcbb1e5257ae75e03450100000000ffffffff0174850100000000002251203e3c9519c91c87e84de71a64f65fa481639c900da4e01ba4c23be539c9065ad400000000", inputs, nonces).unwrap();
    verify_all_inputs(&sign(&pst, &user, &muun), &[prevout("020000000001019da62d921c36e14d8c8567adec86580e95154cddb922f28ed47552f1850272c10000000000feffffff028b4d042a01000000160014290cfc7b1cb593b8b7cfb70e8a5315cb04015fd7a0860100000000002251206814f05813d2505f80ec5a71ca6fbbd99df3aac5e0ed3a506a1c376beb484e9102473044022040d7a4204b14cf1ea32021040d373221f60fcfb42e4da82723b0eb3b7d7bd940022064160bd834d6b530292d9f6f17c07e032a619b88c8ffcb5ef6622a731236ba46012103ff6f07c524f89457d05a1ee9e2b8d1ae2520916748b2da0c7c1d3655f271855e25050000", 1)]);
}

#[test]
fn test_sign_v6() {
    let user = user_key("tprv8dUpNFvQ6NpkxtuYDoDaibgQYbvUnHBqz8GM3zBL4DjNeh9uzhXC49xKx2VksbyxaW3dSFviExbUw4GmkEKJoiTx7UXXi6pPnXMWpB5Lmtf", BASE_PATH);
    let muun = muun_key("tpubDBmgp5wQ4SYkroyXQG3SxUXVZsdmJnL89exWksCAEq9xzujjCd6jpKbYQyyVXLiQk4gBq8AaUULZDbwxFF8DhcTEPzDFYY8g2dsJ1x3xPwN", BASE_PATH);

    let inputs = vec![input(
        "db784dbb4b1fadd2e5c7ecef6a00afb5dcb8dff7a3e649f1e510b704ab2e287e",
        0,
        100_000,
        AddressVersion::V6,
        "m/schema:1'/recovery:1'/external:1/0",
        "bcrt1pcm4wx3q4mnq0feqrvu6g7jp7044rp7tf54zcd7mfndtgfxydmv0qnnmrdl",
    )
    .with_muun_partial_signature(bytes("03722e555ae015f5e5b07ff8915fcf9a155ad74f77e27d5908b5a6c5ea313d71db0319258976bd5f967317c61ce634cf182ead2931fc54e31cc05729014b4d210f66"), bytes("f4d1fee38aebb1d17c0dc85b7a0e48474c0b1de351dfc7f0baa6e9330765881b"))];
    let nonces = fixed_sessions(&["98ca651de1178c9a656dfc51e00bb6ff3dd958922a15a84ef270a81c96bcf510"]);

    let pst = PartiallySignedTransaction::from_hex("01000000017e282eab04b710e5f149e6a3f7dfb8dcb5af006aefecc7e5d2ad1f4bbb4d78db0000000000ffffffff017485010000000000225120e67c60c89364bae43a399e6417a1cce9d2e0498e5eb0646f52d3f279833a2b6000000000", inputs, nonces).unwrap();
    verify_all_inputs(&sign(&pst, &user, &muun), &[prevout("02000000000101f8880208d09f48d849e68d042194b3295401a88dcc9fa5131ecc78130b7480840000000000feffffff02a086010000000000225120c6eae34415dcc0f4e40367348f483e7d6a30f969a54586fb699b5684988ddb1e8b4d042a01000000160014287cd946de86caf84c507e749f2fbe586bce57b30247304402203c30d6522a082228b6b9ee1bc93a576a46d37e17017db2ae7506c8f288ae181f02206f84ed0e17f70e8b49900450c29cfff84d321850a8e4f662216a4d77c3e80795012103ff6f07c524f89457d05a1ee9e2b8d1ae2520916748b2da0c7c1d3655f271855ef9040000", 0)]);
}

#[test]
fn test_sign_all_versions_in_one_transaction() {
    let user = user_key("tprv8dhZ55jWbg1oQHf7BkxL8AFJMWB4gZhyp2tzbHtLQd3g3L7b2MBuq3dEJMdgRevAxQ8BFSjgCRoC5jp9zpDnphGvjq8pT5Q2aA111dg5pxS", BASE_PATH);
    let muun = muun_key("tpubDBCFedMe1hS3ba6qSTivfi2f6MieNcgms1b6b9KK1xD6wtvG82dSvYQFgQcF2MBs4kyWEp7MB8tXgYzxiYpxDBnSU2F1sxrict9bNikM9kc", BASE_PATH);

    let inputs = vec![
        input(
            "c4b43c54fa33b70212c6e4ac6fa5a25a041bfe0aac1c5a793b317276617dcc76",
            0,
            100_000,
            AddressVersion::V3,
            "m/schema:1'/recovery:1'/external:1/2",
            "2NCzGfq4MurQzhodoSFtB2VSEJ8Tc5MN82j",
        )
        .with_muun_signature(bytes("3045022100860c48eb2374dbb67ed68dd91198994407a4e933f92e4f3187706f93debf246b02206b7d0607eaad478f6323cb707344739ce0ba8583266a39b617dd0e5bb77633b501")),
        input(
            "4b4f198a96c5fee378c18f20d34a962031bd9ea759e82be9aedbb0fc5c9ff4b3",
            1,
            100_000,
            AddressVersion::V2,
            "m/schema:1'/recovery:1'/external:1/1",
            "2NA2wRRMNCsfECwvjHwAdPmciFRGrBKzc6W",
        )
        .with_muun_signature(bytes("3045022100c907055dd0033f4f28113f566f68a9c0c400f804d83faca36f5f77a92696bf960220379da01e954f5cdee9fc69dfdf59ac33d36b4af5ea801fd011c2911df2ace2b501")),
        input(
            "4221882416f18f7d534ea757ebb87be84624270b63f73d6552a087166a625468",
            1,
            100_000,
            AddressVersion::V4,
            "m/schema:1'/recovery:1'/external:1/3",
            "bcrt1qf66c9jnszkvk9nl3v2k6t5xy7mxlulh0zualfjts45thle56mfjqvkvgh0",
        )
        .with_muun_signature(bytes("3045022100bb2a22510930bc31ddb6b9245eebe5d22499c54d08b326eebd249403f9f6128b02207c10ec0fb8a336230f352b4d2ed10be91cc31d883fd545dfc5124ce8c63a01bf01")),
        input(
            "5f1ecaa9d05be209edfe804afdabde5dd60b2572d0a18d00dcec0b0f959b8451",
            1,
            100_000,
            AddressVersion::V1,
            "m/schema:1'/recovery:1'/external:1/0",
            "mk5bbq9qZ6Hh6u34wxvA4Hs6cEc4AF2HfL",
        ),
        input(
            "28f06b18512a7796040fe4b34d0c56966ae8325a8c4f6ad9b51319e99ecb697d",
            1,
            100_000,
            AddressVersion::V6,
            "m/schema:1'/recovery:1'/external:1/5",
            "bcrt1ptnkuad8znwtr9q6jj06mdr7smeydjdpqumzxrv9pcyxu3nker0js0h0dfc",
        )
        .with_muun_partial_signature(
            bytes("020129f74df468dadc7a1af0305f12a550a4792559b260f756b67277d1de8d0d6e03fb1229bf2eb848532714bf50d79770b2790c589926b3893c4697106dec17a27f"),
            bytes("1be2d8c9f6781372950374bf6986ea32d40473beac5329ca9fe1fe459ce07e26"),
        ),
        input(
            "1473956088fc55c3388aec1cbd4b49edc8d577640303b0567df0b76d03cf94e8",
            1,
            100_000,
            AddressVersion::V5,
            "m/schema:1'/recovery:1'/external:1/4",
            "bcrt1pwscqkj5p0xl7d6kd0ercc5rv6qzytt3a6jykx35yvfkfkp8yajxs77vg44",
        )
        .with_muun_partial_signature(
            bytes("03b844359aea6df24a8c7e1766b6cc81d86827f6a0239eef26bdd02d19d0c7fed103b5d431f46f51b73572a619355d60592cec11f16491220810070fd5150216fbcc"),
            bytes("ffc0c05c178fedc4ab2c4edc80dbb1a79d0ef5e6c0e3bfb7744215540c70d53c"),
        ),
    ];
    let nonces = fixed_sessions(&[
        "bdc72b8cb2f8278ac5de74a585c8e60729d82635c574a0621e4f086121274227",
        "edb7f1cad77fabe63751fcc30040a91c02675f8d31df424c7a0c723e2134878a",
        "cdac321cead1a473bfdf17329f6c31baf30b9f6bd5931282e3dda5f7b2c16f61",
        "e8a79000514f74990e764e185e5729ec77e17052ff903b8c3788cba3b9e151f3",
        "a71d46b2292b209147776ecc2f72d9e1d8f815e993d566fc168ccb81663155b2",
        "0250df31823ed2e8fda46e928645a23ccbafddf39f7649579807c9e49fe5b143",
    ]);
    let spent = vec![
        prevout("0200000000010148823860c5e3f3db0f1bd0cc70d02f0d773c878c0a366ffcd01be6444d3d0cc00000000000feffffff02a08601000000000017a914d88e83d1a5d3238decb7d4442c24f7bb3b8da52b87b04f042a01000000160014e21f5442bce128b113a9706a0ce53cc3f43943610247304402203a316d5941a810b5aa33cc08d10a88d754285e98fd88e26b6861b5f404b0b546022017024d58a8ab1ca0c33d081c5e6ca3192f3b1ba72676731e52270a5fb74ecb58012103ff6f07c524f89457d05a1ee9e2b8d1ae2520916748b2da0c7c1d3655f271855e25050000", 0),
        prevout("02000000000101873c68ac3f94b583efe49c3f00ae3cc7f77c9a78bccc3fdf61920edd45545b7f0000000000feffffff02b04f042a01000000160014d66fdb6789560b3fd7b0d000da0d6f22b9c70252a08601000000000017a914b82751531d1ff4fefd7fa348b900ba66d17cdcc7870247304402204bddec0acf2a0d33f7ef89f1202c6d7d4c8151756d368cc45b1c3ed3a828e7800220245589b38c63e6f32333f14d6694fc613bd6354ae354f9309f6cd3fae677c50c012103ff6f07c524f89457d05a1ee9e2b8d1ae2520916748b2da0c7c1d3655f271855e25050000", 1),
        prevout("0200000000010161e13760dbe0f3fcab9ed507538890d017812655f218f9bf2e1b38e5792841f80000000000feffffff028b4d042a01000000160014b00f4fabc6dec5f23326c693d92b65573c9433daa0860100000000002200204eb582ca70159962cff162ada5d0c4f6cdfe7eef173bf4c970ad177fe69ada6402473044022012d3ae236f46c2484be4e19792fb9ce7b4f51c76f6b808000e15f8872a280c7502202195bceec3fdb1d7333badf9be8950ae3210438e5ffb2e30a1573302ddeef36a012103ff6f07c524f89457d05a1ee9e2b8d1ae2520916748b2da0c7c1d3655f271855e25050000", 1),
        prevout("020000000001019dcb550b07a53ec866ec2558f94d8b801ef60200378cd78afcde2f123a9d619a0000000000feffffff024d4f042a01000000160014af568af3154b649bcfd7c3bfdb814043412e817fa0860100000000001976a914320cf4affd84615973e948a47a96f9103d68f8c288ac02473044022075bf561de3708e652cc9910edfd56c0158e86d99e8b3e4e1284c1bef13e72d1802203ff834bd90443dafef0488793cc6a007946ec781d4ac0dea5947a28794dfc748012103ff6f07c524f89457d05a1ee9e2b8d1ae2520916748b2da0c7c1d3655f271855e25050000", 1),
        prevout("02000000000101204b88f3b89ad992a9ce63bf857d08f26ee20a0e6bb4e912ddb41f56d145078c0000000000feffffff028b4d042a01000000160014032c403be2d0a8bb0f3db634a68b31d31fb498c9a0860100000000002251205cedceb4e29b9632835293f5b68fd0de48d93420e6c461b0a1c10dc8ced91be50247304402202523ae6ed227cc7b80f34eb7662d3e90681666828b9ae437249d125dfc14dba602207a82b7ac2ae18ed0e742245e8277364b6bec00a0c7dc428085b577c9a3e98ffe012103ff6f07c524f89457d05a1ee9e2b8d1ae2520916748b2da0c7c1d3655f271855e25050000", 1),
        prevout("02000000000101e33e3ed531e1956474279b70325c8ad5283706fe8bd29b1358f1e1d4d0aac8a30000000000feffffff028b4d042a01000000160014da492a8cc860dab06f59d941c2dec6e88a29b545a08601000000000022512074300b4a8179bfe6eacd7e478c506cd00445ae3dd489634684626c9b04e4ec8d02473044022037b78bd154dac8dcda7ae9f109f4612add9396731bb01ad44f58e14011f7be0f022042b5b13e03815d9ae5748d28d9e70274d9474a315e928b37c4d5a3916572c0af012103ff6f07c524f89457d05a1ee9e2b8d1ae2520916748b2da0c7c1d3655f271855e1b050000", 1),
    ];

    let pst = PartiallySignedTransaction::from_hex("010000000676cc7d617672313b795a1cac0afe1b045aa2a56face4c61202b733fa543cb4c40000000000ffffffffb3f49f5cfcb0dbaee92be859a79ebd3120964ad3208fc178e3fec5968a194f4b0100000000ffffffff6854626a1687a052653df7630b272446e87bb8eb57a74e537d8ff116248821420100000000ffffffff51849b950f0becdc008da1d072250bd65ddeabfd4a80feed09e25bd0a9ca1e5f0100000000ffffffff7d69cb9ee91913b5d96a4f8c5a32e86a96560c4db3e40f0496772a51186bf0280100000000ffffffffe894cf036db7f07d56b003036477d5c8ed494bbd1cec8a38c355fc88609573140100000000ffffffff01b820090000000000225120a21f34d36f71805071d0e3cb9cd92b0f8267b7ac95db0d60a60d7ec6bbff12db00000000", inputs, nonces).unwrap();
    verify_all_inputs(&sign(&pst, &user, &muun), &spent);
}

#[test]
fn test_sign_submarine_swap_v1() {
    let user = user_key("tprv8fFtghPy2BsdB8nrBZcrHSihQDb65yVJa5DfLcFdtjnRc8SQcV4d59hZAzn2auLdEom9KscWv5JAuxUG65gDYiBxwbGarcix7H2Vp8xXPnX", BASE_PATH);
    let muun = muun_key("tpubDBZaivUL3Hv8r25JDupShPuWVkGcwM7NgbMBwkhQLfWu18iBbyQCbRdyg1wRMjoWdZN7Afg3F25zs4c8E6Q4VJrGqAw51DJeqacTFABV9u8", BASE_PATH);

    let mut swap_input = input(
        "8cbde526dc25920e0883694b178007e084d9c4f76b3141064129538710ce8bf1",
        1,
        18_400,
        AddressVersion::SubmarineSwapV1,
        "m/schema:1'/recovery:1'/change:0/7",
        "2MtLiXVbDBQdHKDAKwAL5AnsTo6LoCakjvg",
    );
    swap_input.submarine_swap_v1 = Some(SubmarineSwapV1Data {
        refund_address: "n3yUtyw6xAnYNpfkbuVKPSqnGdbqsLNePr".to_string(),
        payment_hash: bytes("0634be42f7a600c0457ace25f2502e9e473b7d5f0e50172dcce25044c8538936"),
        server_public_key: bytes("035560f6c13e630b4a4b58dac162d4cebd97eb7a96c7ba3636a0bece5c19c2c6dd"),
        lock_time: 911,
    });

    let inputs = vec![
        input(
            "5ec0cee7e72dc02c910d99389d7ec305d3fb36103b3bc3066858406e7d8c601a",
            0,
            599_817_960,
            AddressVersion::V3,
            "m/schema:1'/recovery:1'/external:1/2",
            "2MuQqs3e42GpYteWDGEN16TqCQDC8oGCpiV",
        )
        .with_muun_signature(bytes("3044022032b35746170883b2f46c2f14019eb95e2e7e4d800248e6a8b372e504dc48674b02202ff47b29abf8f1be8719e757cbd218a4111c214b0c1aa4bdfc7debaf1b46880f01")),
        swap_input,
    ];
    let spent = vec![
        prevout("0100000006f65ae1c782a5b37795a203a8820719100b1c82f59a4aa1cf3bbcc121442636a50000000023220020f1dcb100a8f4249af53e2ef831e2164545f329a5e8cda589210c033896cd1f12fffffffff21cc482a9359d2762f0a3621eb825e4e728b848588767aecdd8f906833e578e0100000023220020f1dcb100a8f4249af53e2ef831e2164545f329a5e8cda589210c033896cd1f12ffffffff68b507462f19a913b7a6a2a6956cd1c514e66b669d50b3f6228cc21935b78b7f00000000232200203ec9de492dfda91c6d7e84a14f478b1fd6c4b3432aeb4262482133975f94e8f2fffffffff18bce10875329410641316bf7c4d984e00780174b6983080e9225dc26e5bd8c00000000232200209f60ba93792ab212523ad6e6daaefb06d3d0c14ba02ddeaa38582031578bbbd3ffffffff741c42cabd1464b5752e4050acc9d9dfa7ccb296d3847a0e7da6d90effa0d80b0000000023220020d4cf5b8c1ddaa1e2788596655df089cbe10ad33bae149160e07dd76b54e2a1e3ffffffffa609573ae63856433d80793d44d05b077b2c5ef1cc04d820de0d107303ce831b0000000023220020b90f5d2eaf489a24ec6f6d93a47536145fbae13b745fbc7ef9fc5a16d1fa2408ffffffff01e87ec0230000000017a91417c1f13d6ba17a62d6f1f784927c0d45ba22f6fa8700000000", 0),
        prevout("0100000001c00ee241359fa47d45f4f08b67e37f7a31ebe996da59513dfc6c5af97a3959610100000023220020f1dcb100a8f4249af53e2ef831e2164545f329a5e8cda589210c033896cd1f12ffffffff02a064f5050000000017a914d2bf8b44779443e9a7571ab416c72cdee9e9d06e87e04700000000000017a9140c02072aee07d46ab06edb7d75d538c133ebd8c38700000000", 1),
    ];

    let pst =
        PartiallySignedTransaction::from_hex("01000000021a608c7d6e40586806c33b3b1036fbd305c37e9d38990d912cc02de7e7cec05e0000000000fffffffff18bce10875329410641316bf7c4d984e00780174b6983080e9225dc26e5bd8c0100000000feffffff01705bc0230000000017a91470fcbc29723c85fdbf9fb5189220f279e9be4508878f030000", inputs, MusigNonces::generate(2)).unwrap();
    verify_all_inputs(&sign(&pst, &user, &muun), &spent);
}

#[test]
fn test_sign_submarine_swap_v2() {
    let user = user_key("tprv8ZgxMBicQKsPdu1SiZiQbV4K2af648S6jf8Axu7RkgQborzWpQVRzrSvyoYWb5Rmy8VVyFBDjZobn7ZaK3Ax2hLvF9NxJ6gUWNLwgLxRav7", "m");
    let muun = muun_key("tpubD6NzVbkrYhZ4Yg872usw1wxNYrpCsUmiG4faYMaogSFwJFX9sz8MrR6GNKg4qUDjb3KUYcC9nrUL7tQYfK441qkFP9pwsw6fb8gTW7vJjXq", "m");

    let mut swap_input = input(
        "79b47931c73a331348ed86e29dd650362689273a1a95ae4df9c452f252951e0a",
        0,
        1_000,
        AddressVersion::SubmarineSwapV2,
        "m",
        "2NGGJJARaFRcARRMDeSWQ46LwU46Z9oKNCZ",
    );
    swap_input.submarine_swap_v2 = Some(SubmarineSwapV2Data {
        payment_hash: bytes("cdb14d5fcf498e8785caff18940bbd713b98b4d425ab0503adb92ab08c5850e3"),
        user_public_key: user.public_key().raw().to_vec(),
        muun_public_key: muun.raw().to_vec(),
        server_public_key: bytes("0226048275203811ab30a61759f8271280cb754ede8c38b5c51fc662dec441511e"),
        blocks_for_expiration: 144,
        server_signature: Some(bytes("304402207bd5a91f032ed3d69a7999d170c696861f36991f6b54e24da4319eaf512ccac402203d3d14c42103261f605b3a870ab10b03ff8b84537575768067e41853d77d2b2401")),
    });

    let pst = PartiallySignedTransaction::from_hex(
        "010000000001010a1e9552f252c4f94dae951a3a2789263650d69de286ed4813333ac73179b4790000000023220020fc4ea5a79e0de596005a77df25fdc1d76a5bd2ca022b58260830b45dbf48005fffffffff0100000000000000001976a91476e6856729db9c3885fbd72c47bd225990eee4ad88ac03473044022038395a9846c02cc1b87655ea4679f3df127fa5f781c7db3598ee43acc65adab4022051f0f874a8c16544c4ab492b8a091b630703d742599ea17c61b2bfadb747f30e0147304402207bd5a91f032ed3d69a7999d170c696861f36991f6b54e24da4319eaf512ccac402203d3d14c42103261f605b3a870ab10b03ff8b84537575768067e41853d77d2b240187210310df0c435a58758d53821915501301581be8c18b63d5a0dab281aa7f98bcb6e67c210226048275203811ab30a61759f8271280cb754ede8c38b5c51fc662dec441511eac637c76a914f722e6b3c976eba035578a7b268de980682d60b1876375677cac6867029000b275ad76a9141528942b8aef6f523d8050ad6bab416d6199352288ac6800000000",
        vec![swap_input],
        MusigNonces::generate(1),
    )
    .unwrap();
    verify_all_inputs(&sign(&pst, &user, &muun), &[prevout("0100000001b9c3208b3cd1c687d73fec2022ac6ce057c00cf8ae060e5579107a8d99681a7f000000006a473044022042d2e34afb3b66b27641c774b467ce854cfa5d4f9a1eaa462174fa3c688208840220651fdeab3a8134c65431dba040b654d9d21f50343f82bc1870b5280eaff89fc101210209d4e395ce720f13439f4f73b0dac8433f2fa17f094c5fcdaa6965bf96ece088ffffffff02e80300000000000017a914fc7ee7c4ce68ca09559d9e8776f0455039ea18d58718ee052a010000001976a9143447bbd5107cb1572eeb8550f74e5d31a4bf5bd888ac00000000", 0)]);
}

// ─── Incoming swaps ───

const INCOMING_TX: &str = "0100000001e3d55a5423fd70679839f47ed496d61bd4d0964acfa556172c945041eddf3d400000000000ffffffff02f875000000000000220020f411b28870bf089c41f703dbc1a428d60eb7cce61a9d4fa4a5c28ead872d8551963d000000000000220020eee7f6df991fac39aa2fd8054c83ef045c9569507fe4a224c8320162c028267600000000";
const INCOMING_HTLC_TX: &str = "020000000001042d54f0cbba265e7f2a0873ce9e03879b706b361d3ee18e8d4a29300c0948bee50000000017160014a411cc351bd7c5572a6ba5ba16e3f3f92106425bfeffffff330565534d05b1d0d4b8a1878f1a5c41d3f571f793c528a44d72af276a259bbd000000001716001443891b3727c96d1e1e91aec69b167123a429ed32feffffff4bb7cba13999b98510769270d161f2a8e0f80f1033c72579a78c105ab2b30ebf00000000171600141c9e61f3951956b00c6f215e75e7fb9a5d93988ffefffffffaa153f428dc6c0aa0be74fa56d6563556b4286d5f9b8a431d5acf0b08f00240000000001716001488ef3cc57c509e843387a7c74e55fdc27fe962f2feffffff0178b4000000000000220020b476030d986b5a4bb084702eec3d895a40d02cfef216f09962cac94a8bd119a102473044022059247039c8e3e95d2eb289e35f81b67e5811d5a757b2117cc9dab1cebf830b2e02204d15406ea075d3d4973344b9bf7c151bb39a7e2876551b8500057dce4591fb870121033d8377beee8caf5fccd958bfacfdd3b5dc1948dfad9fb09768d11e69abb76f3402473044022042e242e0c3adca4f8b3a19cbd8eefd80bf8a43debbe51c5759b2f607b7332bc6022020be1288b8dcddfdc1569c766490e8c0ea668ea1bc122d40b59cbe6589e6938701210243b39e7a2d42937b5aecf14d27b200f7486397d92cbb166ae9f3c11259caf9c602473044022024b16f6042b9a664a46ab0c8cfc3424f8a100309f4cb51e9969a62a257255e2b022053f09e518d2ba73f74d7f3feca98df2b38eb45870325a433457277caf1ce7e6a012103f0386dfb783fc1b55d50aa089326dc008fe2fa963b44d3851bc307bbc419d1c4024730440220346c877b9e983a20fbc52fca2132717e2647bba5489e4127e8032c263252c7d502202cea58c807f60c4b6e10262a2eb59daa8bf637465a4ad67db83c59768088bfb70121020dd5d5044667ebd71f0917a6182435afeb408b4142932c9f5d852b5623ca5d6800000000";
const INCOMING_PAYMENT_HASH: &str = "b0e74c22943fd1e2ee86b14fb6f6636c19649910705913f5bfc33014e0ca0fd4";
const INCOMING_PREIMAGE: &str = "D7EA6B6FE58119AA061CBA3A3C1B556DE966053EE0B8A455A2FA5BA6EAE978FA";
const INCOMING_INVOICE_PATH: &str = "m/schema:1'/recovery:1'/invoices:4/1189547938/512484821";

/// Accepts every onion, remembering the expiry and amount it was asked about.
#[derive(Default)]
struct AcceptingSphinx {
    calls: Mutex<Vec<(u32, u64)>>,
}

impl SphinxValidator for AcceptingSphinx {
    fn validate(
        &self,
        onion: &[u8],
        payment_hash: &[u8],
        payment_secret: &[u8],
        _node_key: &SecretKey,
        expiry: u32,
        amount_msat: u64,
        _network: Network,
    ) -> Result<(), SphinxError> {
        assert!(!onion.is_empty());
        assert_eq!(payment_hash, &bytes(INCOMING_PAYMENT_HASH)[..]);
        assert_eq!(payment_secret, &bytes("E06E5076678201F6B1324421315E16B093D7E24CC6F3D76F5A900D6D5DB6313A")[..]);
        self.calls.lock().unwrap().push((expiry, amount_msat));
        Ok(())
    }
}

fn incoming_keys() -> (ExtendedPrivateKey, ExtendedPublicKey) {
    (
        user_key("tprv8deMke4d4jbc5wVYMaDpoqsXYuEPvwLPN43iRRwdZqVJCr9Wc9xh5194mMJeLTkLfQHS5CgkuXbZ9uwK9Eogcx2t7JoscYtrFirGsc3kgCr", BASE_PATH),
        muun_key("tpubDBZaivUL3Hv8r25JDupShPuWVkGcwM7NgbMBwkhQLfWu18iBbyQCbRdyg1wRMjoWdZN7Afg3F25zs4c8E6Q4VJrGqAw51DJeqacTFABV9u8", BASE_PATH),
    )
}

fn incoming_input(preimage: Option<Vec<u8>>, htlc_output_key_path: Option<String>) -> Input {
    let mut htlc_input = input(
        "403ddfed4150942c1756a5cf4a96d0d41bd696d47ef439986770fd23545ad5e3",
        0,
        46_200,
        AddressVersion::IncomingSwap,
        "m/schema:1'/recovery:1'/invoices:4/1189547938/512484821/1",
        "bcrt1qk3mqxrvcdddyhvyywqhwc0vftfqdqt877gt0pxtzety54z73rxsse9hyt9",
    )
    .with_muun_signature(bytes("3045022100c4bef5d32c5ed3530cd258df645dfb0298744dee7820095aca1a188a3b2138c102201669e21db8ee4d2b090cbb18e3e52bce40fc5e07be73c1be4d26c9f13c02e69701"));
    htlc_input.incoming_swap = Some(IncomingSwapData {
        sphinx: Some(bytes("00035a24206be286645b5e2f81fe6d35bf26ceb70b15257f19e3b744c0ed855c3d8e60c5a8d7553d0a39dd162a50df5169f18129a737da3427095e1049c356e02bb71d9c70858bbf3936fb555c283d9015f4b85d629a24e84c61dc69d537545e4c0104a87a9ab6277083cf7cb21a56f10ed23e754adf357a638970fbcd38e985f42c44b69f1cfaac8dbf711a5b8edf56383d56ad4cafb297025fad5f9c3e79dad7d1342cabde86ea85950bb80237d95b676939461aed0447b88d0010023d653abf498780f7d8f9a1e5784638c893caefe95e23a85285b636ce2af87613c275e61da65255dba4f4bacde8d6efd1c29a4f8e3efb98a3881e280b8613d45dbe38b7b895621850322be927a6beb6aa183c9a11dbf29da8a3d2f6b0b6b8c7e1c62d4926f3dc1e06ead192daba315fbcd5edd2a7d08bcfa50d1b2cc799e98b3415202e7cd91ff54962e4e1d5716c339718ebea926db6e24aacf35ebc362aafcfde4d6264d56a6edf430ae4ade75cdf9c121c3708211407d5c7ad23e2bc8dfe0d71e588b01d2ada797830315ba616f6c79030481dde1d8aa1a37676aaa9a48aec1dcc535daf2547cff2d43c58acd7e09473c46cada1112e82b0502d057ce6a8a629836ea293be93c5d228169c46d0643378e20429ba09e0a236f8dc56a23e9d38509a72e3bb115dc7c959af913b7d561d17fd3df8d490e2d91c4ae16429a3ecfa45212dbd6ccd80d4ac5956ade21c46b4960c08570e0af69ee39d1c23b194f20bc4d5d5cb5ec0b1e3a376a51700d166dce2b09a6e0c2285af7d36c4d0178a1acad0bfd8d913c44506987df6406ad7f134927c5d46be261cc4025f6310e8cb8284f03ae75a75d4ca43ba1d578b1be69d76503370f95eb98a769eaf1e7c3032907f9ab50c450b7177a804b2e9cb8c5a6fe5bbeb07d0ad176961f817119989f090ad162cae302242651c0c69e7b52c36665be795538afc3aef77a1cd0a36a170d572f56eb79e07ee6544da446798b5e0a0ed92cd205288824335b0444e5eda4347d28be9b2a128d50f983c5b16ea2792eda5d352b609a08a15268e758e024dbde13ae42008c03c608c6bb1971c9eb7a1842129b056b9c0690a88c1aea43f9bc20d8e132575a1eae77ba2fe24ee780f42e6b73b7022049518f1c231fd4fe3e91ca443980e52507ebc97f8fc49036c6e141c0e74603ac02814aa0928381228f7aadd798dbaac3603099e94224dd0b51466d392d276f19b990e8b351b73d3e284fc24f1c1ee0bffad64d9415ae8ab358b01dbc7eedfadb181ab8080d0f9c151c445419ee670e8376a112a631c5ec4092aca077086299e406ab304c7f864da801147b0e09b9f8873c85e952550b62684ca9217d1c0763930b019871787b07cabe0ef8b541c2375bc7ceb4ec1153e6f8a48371f7f80c69dcd37a7d53053fde41f87231abdbed68f195ddc6082b9d0e55207fea2c4d0c8045d44bfe55de2fb71ed75f12c0105a2ea480678b73100a943c45b6d2d5556ece82f02bd12d8785f38ac96bba1167b27b40dbd4d1677cf0b96f9311382cc110f739ffba634fa5163c9e1bd6f0279356aeab301eca2398525ec136d9d3aab4634a1fe14b365c8ad4f98e217cdba327945dfe69f3a3b7f8cd932bd761b2b264a371b104559d0a69c8e7ac053512f3e7fd2cf64278f33f7288958042b3166ff0f05e174378c80ab8d01332e862f17e8cd5c74b3de9acb51e9526d8d3305fa51b447fcb289b26c96ff06e6d50a639514491077c9f70757b74c7e26800688a05274fdcf2697e69455742126dc0df95512e478417db81440a5d2f8c671df00d0bafca53a8ed4bf6c8ea0a4c8af39c7bb1103b828547b669b75f780d9d78ddd811dd1a639576b19805088c33e6e7855cc360827516f4de8f4788bf81feb45d6d31ba5277bca2c86d84f8a")),
        htlc_tx: bytes(INCOMING_HTLC_TX),
        payment_hash: bytes(INCOMING_PAYMENT_HASH),
        swap_server_public_key: bytes("03912b4cfbd725133cbc319b444c1dad96a8bb0fcf840adc28c8e05e84ecbaa89b"),
        expiration_height: 5528,
        collect_sat: 0,
        preimage,
        htlc_output_key_path,
    });
    htlc_input
}

fn invoice_store() -> MemoryInvoiceStore {
    let store = MemoryInvoiceStore::new();
    store
        .insert(InvoiceSecrets {
            payment_hash: bytes(INCOMING_PAYMENT_HASH),
            preimage: bytes(INCOMING_PREIMAGE),
            payment_secret: bytes("E06E5076678201F6B1324421315E16B093D7E24CC6F3D76F5A900D6D5DB6313A"),
            key_path: INCOMING_INVOICE_PATH.to_string(),
            amount_sat: 46_200,
        })
        .unwrap();
    store
}

#[test]
fn test_sign_incoming_swap_from_invoice() {
    let (user, muun) = incoming_keys();
    let store = invoice_store();
    let sphinx = AcceptingSphinx::default();
    let ctx = SigningContext::new(Network::Regtest, &store, &sphinx);

    let pst = PartiallySignedTransaction::from_hex(
        INCOMING_TX,
        vec![incoming_input(None, None)],
        MusigNonces::generate(1),
    )
    .unwrap();
    let signed = pst.sign(&user, &muun, &ctx).unwrap();

    verify_all_inputs(&signed, &[prevout(INCOMING_HTLC_TX, 0)]);
    // Plain signing does not check the onion amount
    assert_eq!(*sphinx.calls.lock().unwrap(), vec![(5528, 0)]);
}

#[test]
fn test_sign_incoming_swap_collaboratively() {
    let (user, muun) = incoming_keys();

    let pst = PartiallySignedTransaction::from_hex(
        INCOMING_TX,
        vec![incoming_input(
            Some(bytes(INCOMING_PREIMAGE)),
            Some(format!("{}/1", INCOMING_INVOICE_PATH)),
        )],
        MusigNonces::generate(1),
    )
    .unwrap();

    // No invoice and no onion decoder: the cosigner supplied everything
    let signed = sign(&pst, &user, &muun);
    verify_all_inputs(&signed, &[prevout(INCOMING_HTLC_TX, 0)]);
}

#[test]
fn test_incoming_swap_refusals() {
    let (user, muun) = incoming_keys();

    // Invoice known but the onion cannot be checked
    let store = invoice_store();
    let sphinx = UnavailableSphinxValidator;
    let ctx = SigningContext::new(Network::Regtest, &store, &sphinx);
    let pst = PartiallySignedTransaction::from_hex(
        INCOMING_TX,
        vec![incoming_input(None, None)],
        MusigNonces::generate(1),
    )
    .unwrap();
    let err = pst.sign(&user, &muun, &ctx).unwrap_err();
    assert!(matches!(err.root(), SignError::Sphinx(_)));

    // Not our invoice
    let empty = MemoryInvoiceStore::new();
    let ctx = SigningContext::new(Network::Regtest, &empty, &sphinx);
    let err = pst.sign(&user, &muun, &ctx).unwrap_err();
    assert!(matches!(err.root(), SignError::InvoiceNotFound(_)));

    // Cosigner preimage that does not match the payment hash
    let pst = PartiallySignedTransaction::from_hex(
        INCOMING_TX,
        vec![incoming_input(
            Some(vec![0x42; 32]),
            Some(format!("{}/1", INCOMING_INVOICE_PATH)),
        )],
        MusigNonces::generate(1),
    )
    .unwrap();
    let err = pst.sign(&user, &muun, &ctx).unwrap_err();
    assert!(matches!(err.root(), SignError::PreimageMismatch));
}

// ─── Locally built wallets ───

const WALLET_VERSIONS: [AddressVersion; 6] = [
    AddressVersion::V1,
    AddressVersion::V2,
    AddressVersion::V3,
    AddressVersion::V4,
    AddressVersion::V5,
    AddressVersion::V6,
];

struct Wallet {
    user: ExtendedPrivateKey,
    muun: ExtendedPrivateKey,
}

impl Wallet {
    fn new() -> Self {
        Self {
            user: ExtendedPrivateKey::new_master(&[0x31; 32], Network::Regtest).unwrap(),
            muun: ExtendedPrivateKey::new_master(&[0x32; 32], Network::Regtest).unwrap(),
        }
    }

    fn path(leaf: usize) -> String {
        format!("{}/external:1/{}", BASE_PATH, leaf)
    }

    fn address(&self, version: AddressVersion, leaf: usize) -> MuunAddress {
        let path = Self::path(leaf);
        create_address(
            version,
            &self.user.derive_to(&path).unwrap().public_key(),
            &self.muun.derive_to(&path).unwrap().public_key(),
        )
        .unwrap()
    }
}

/// A funding tx paying `amount` to each address, and a spend of all of them
/// to `destination`.
fn fund_and_spend(addresses: &[MuunAddress], amount: u64, destination: &MuunAddress, fee: u64) -> (Transaction, Transaction) {
    let funding = Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: vec![TxIn::default()],
        output: addresses
            .iter()
            .map(|a| TxOut {
                value: Amount::from_sat(amount),
                script_pubkey: a.script_pubkey(Network::Regtest).unwrap(),
            })
            .collect(),
    };
    let funding_txid = funding.compute_txid();

    let spend = Transaction {
        version: Version::TWO,
        lock_time: absolute::LockTime::ZERO,
        input: (0..addresses.len())
            .map(|i| TxIn {
                previous_output: OutPoint::new(funding_txid, i as u32),
                script_sig: ScriptBuf::new(),
                sequence: Sequence::MAX,
                witness: Witness::new(),
            })
            .collect(),
        output: vec![TxOut {
            value: Amount::from_sat(amount * addresses.len() as u64 - fee),
            script_pubkey: destination.script_pubkey(Network::Regtest).unwrap(),
        }],
    };
    (funding, spend)
}

fn funded_inputs(funding: &Transaction, addresses: &[MuunAddress]) -> Vec<Input> {
    addresses
        .iter()
        .enumerate()
        .map(|(i, address)| {
            Input::new(
                Outpoint {
                    txid: funding.compute_txid(),
                    index: i as u32,
                    amount: funding.output[i].value,
                },
                address.clone(),
            )
        })
        .collect()
}

#[test]
fn test_fully_sign_every_wallet_version() {
    let wallet = Wallet::new();
    let addresses: Vec<MuunAddress> = WALLET_VERSIONS
        .iter()
        .enumerate()
        .map(|(leaf, version)| wallet.address(*version, leaf))
        .collect();
    let destination = wallet.address(AddressVersion::V4, 100);
    let (funding, spend) = fund_and_spend(&addresses, 50_000, &destination, 10_000);

    let pst = PartiallySignedTransaction::new(
        spend,
        funded_inputs(&funding, &addresses),
        MusigNonces::generate(addresses.len()),
    )
    .unwrap();

    pst.verify(
        &SigningExpectations::new(destination.address.clone(), 290_000, None, 10_000),
        &wallet.user.public_key(),
        &wallet.muun.public_key(),
    )
    .unwrap();

    let store = MemoryInvoiceStore::new();
    let sphinx = UnavailableSphinxValidator;
    let ctx = SigningContext::new(Network::Regtest, &store, &sphinx);
    let signed = pst.fully_sign(&wallet.user, &wallet.muun, &ctx).unwrap();

    verify_all_inputs(&signed, &funding.output);
}

#[test]
fn test_cosigned_round_trip() {
    let wallet = Wallet::new();
    let secp = Secp256k1::new();
    let addresses = vec![
        wallet.address(AddressVersion::V4, 0),
        wallet.address(AddressVersion::V6, 1),
    ];
    let destination = wallet.address(AddressVersion::V6, 2);
    let (funding, spend) = fund_and_spend(&addresses, 80_000, &destination, 2_000);

    let nonces = MusigNonces::generate(2);
    let user_v4 = wallet.user.derive_to(&Wallet::path(0)).unwrap().ec_public_key();
    let muun_v4 = wallet.muun.derive_to(&Wallet::path(0)).unwrap();
    let user_v6 = wallet.user.derive_to(&Wallet::path(1)).unwrap().ec_public_key();
    let muun_v6 = wallet.muun.derive_to(&Wallet::path(1)).unwrap();
    let user_nonce = nonces.public_nonce_for(1, MusigVersion::V100, &user_v6).unwrap();

    let store = MemoryInvoiceStore::new();
    let sphinx = UnavailableSphinxValidator;
    let ctx = SigningContext::new(Network::Regtest, &store, &sphinx);

    // The user only ever holds the cosigner's xpub at the base path
    let user_base = wallet.user.derive_to(BASE_PATH).unwrap();
    let muun_base = wallet.muun.derive_to(BASE_PATH).unwrap().public_key();

    // Nothing from the cosigner yet
    let pending = PartiallySignedTransaction::new(spend.clone(), funded_inputs(&funding, &addresses), nonces.clone()).unwrap();
    let err = pending.sign(&user_base, &muun_base, &ctx).unwrap_err();
    assert!(err.is_awaiting_cosigner());

    // Cosigner side
    let mut cache = SighashCache::new(&spend);
    let v4_sighash = cache
        .p2wsh_signature_hash(
            0,
            &multisig_script(&user_v4, &muun_v4.ec_public_key()),
            funding.output[0].value,
            EcdsaSighashType::All,
        )
        .unwrap();
    let v4_signature = bitcoin::ecdsa::Signature {
        signature: secp.sign_ecdsa(&Message::from_digest(v4_sighash.to_byte_array()), &muun_v4.ec_private_key()),
        sighash_type: EcdsaSighashType::All,
    };
    let v6_sighash = cache
        .taproot_key_spend_signature_hash(1, &Prevouts::All(&funding.output), TapSighashType::All)
        .unwrap();
    let cosigner = compute_cosigner_partial_signature(
        MusigVersion::V100,
        &v6_sighash.to_byte_array(),
        &user_v6,
        &muun_v6.ec_private_key(),
        &user_nonce,
        &SessionId::random(),
        &MusigTweaks::bip86(),
    )
    .unwrap();

    let mut inputs = funded_inputs(&funding, &addresses);
    inputs[0].muun_signature = Some(v4_signature.to_vec());
    inputs[1].muun_public_nonce = Some(cosigner.public_nonce.to_bytes().to_vec());
    inputs[1].muun_signature = Some(cosigner.partial_signature.to_bytes().to_vec());

    let pst = PartiallySignedTransaction::new(spend, inputs, nonces).unwrap();
    let signed = pst.sign(&user_base, &muun_base, &ctx).unwrap();
    verify_all_inputs(&signed, &funding.output);
}
