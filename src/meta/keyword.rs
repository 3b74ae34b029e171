//! The closed set of keywords that may start a line in any Tor document.
//!
//! Every recognized line-leading token maps to exactly one [`Keyword`];
//! anything else maps to [`Keyword::Unrecognized`]. Lookup goes through a
//! perfect hash map built at compile time.

use std::fmt;

/// Declare the [`Keyword`] enum together with its lookup table.
///
/// ```ignore
/// decl_keywords! {
///     "router" => Router,
///     "published" => Published,
/// }
/// ```
macro_rules! decl_keywords {
    { $( $s:literal => $i:ident ),* $(,)? } => {
        /// A keyword identifying the type of a line in a Tor document.
        #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum Keyword {
            $( #[doc = concat!("`", $s, "`")] $i, )*
            /// Any token not listed above.
            Unrecognized,
        }

        static KEYWORDS: phf::Map<&'static str, Keyword> = phf::phf_map! {
            $( $s => Keyword::$i, )*
        };

        impl Keyword {
            /// Find the keyword for a token as found at the start of a line.
            pub fn from_token(s: &str) -> Keyword {
                KEYWORDS.get(s).copied().unwrap_or(Keyword::Unrecognized)
            }

            /// The token of this keyword, as written in documents.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( Keyword::$i => $s, )*
                    Keyword::Unrecognized => "<unrecognized>",
                }
            }
        }
    };
}

decl_keywords! {
    // server descriptors
    "router" => Router,
    "identity-ed25519" => IdentityEd25519,
    "master-key-ed25519" => MasterKeyEd25519,
    "bandwidth" => Bandwidth,
    "platform" => Platform,
    "published" => Published,
    "fingerprint" => Fingerprint,
    "hibernating" => Hibernating,
    "uptime" => Uptime,
    "onion-key" => OnionKey,
    "onion-key-crosscert" => OnionKeyCrosscert,
    "ntor-onion-key" => NtorOnionKey,
    "ntor-onion-key-crosscert" => NtorOnionKeyCrosscert,
    "signing-key" => SigningKey,
    "accept" => Accept,
    "reject" => Reject,
    "ipv6-policy" => Ipv6Policy,
    "router-sig-ed25519" => RouterSigEd25519,
    "router-signature" => RouterSignature,
    "contact" => Contact,
    "bridge-distribution-request" => BridgeDistributionRequest,
    "family" => Family,
    "family-cert" => FamilyCert,
    "read-history" => ReadHistory,
    "write-history" => WriteHistory,
    "eventdns" => Eventdns,
    "caches-extra-info" => CachesExtraInfo,
    "extra-info-digest" => ExtraInfoDigest,
    "hidden-service-dir" => HiddenServiceDir,
    "protocols" => Protocols,
    "allow-single-hop-exits" => AllowSingleHopExits,
    "or-address" => OrAddress,
    "tunnelled-dir-server" => TunnelledDirServer,
    "proto" => Proto,
    "router-digest" => RouterDigest,
    "router-digest-sha256" => RouterDigestSha256,
    "overload-general" => OverloadGeneral,

    // extra-info descriptors
    "extra-info" => ExtraInfo,
    "ipv6-read-history" => Ipv6ReadHistory,
    "ipv6-write-history" => Ipv6WriteHistory,
    "geoip-db-digest" => GeoipDbDigest,
    "geoip6-db-digest" => Geoip6DbDigest,
    "geoip-start-time" => GeoipStartTime,
    "geoip-client-origins" => GeoipClientOrigins,
    "dirreq-stats-end" => DirreqStatsEnd,
    "dirreq-v2-ips" => DirreqV2Ips,
    "dirreq-v3-ips" => DirreqV3Ips,
    "dirreq-v2-reqs" => DirreqV2Reqs,
    "dirreq-v3-reqs" => DirreqV3Reqs,
    "dirreq-v2-share" => DirreqV2Share,
    "dirreq-v3-share" => DirreqV3Share,
    "dirreq-v2-resp" => DirreqV2Resp,
    "dirreq-v3-resp" => DirreqV3Resp,
    "dirreq-v2-direct-dl" => DirreqV2DirectDl,
    "dirreq-v3-direct-dl" => DirreqV3DirectDl,
    "dirreq-v2-tunneled-dl" => DirreqV2TunneledDl,
    "dirreq-v3-tunneled-dl" => DirreqV3TunneledDl,
    "dirreq-read-history" => DirreqReadHistory,
    "dirreq-write-history" => DirreqWriteHistory,
    "entry-stats-end" => EntryStatsEnd,
    "entry-ips" => EntryIps,
    "cell-stats-end" => CellStatsEnd,
    "cell-processed-cells" => CellProcessedCells,
    "cell-queued-cells" => CellQueuedCells,
    "cell-time-in-queue" => CellTimeInQueue,
    "cell-circuits-per-decile" => CellCircuitsPerDecile,
    "conn-bi-direct" => ConnBiDirect,
    "ipv6-conn-bi-direct" => Ipv6ConnBiDirect,
    "exit-stats-end" => ExitStatsEnd,
    "exit-kibibytes-written" => ExitKibibytesWritten,
    "exit-kibibytes-read" => ExitKibibytesRead,
    "exit-streams-opened" => ExitStreamsOpened,
    "hidserv-stats-end" => HidservStatsEnd,
    "hidserv-rend-relayed-cells" => HidservRendRelayedCells,
    "hidserv-dir-onions-seen" => HidservDirOnionsSeen,
    "hidserv-v3-stats-end" => HidservV3StatsEnd,
    "hidserv-rend-v3-relayed-cells" => HidservRendV3RelayedCells,
    "hidserv-dir-v3-onions-seen" => HidservDirV3OnionsSeen,
    "padding-counts" => PaddingCounts,
    "bridge-stats-end" => BridgeStatsEnd,
    "bridge-ips" => BridgeIps,
    "bridge-ip-versions" => BridgeIpVersions,
    "bridge-ip-transports" => BridgeIpTransports,
    "transport" => Transport,
    "overload-ratelimits" => OverloadRatelimits,
    "overload-fd-exhausted" => OverloadFdExhausted,

    // microdescriptors
    "a" => A,
    "family-ids" => FamilyIds,
    "p" => P,
    "p6" => P6,
    "id" => Id,

    // network status documents
    "network-status-version" => NetworkStatusVersion,
    "vote-status" => VoteStatus,
    "consensus-methods" => ConsensusMethods,
    "consensus-method" => ConsensusMethod,
    "valid-after" => ValidAfter,
    "fresh-until" => FreshUntil,
    "valid-until" => ValidUntil,
    "voting-delay" => VotingDelay,
    "client-versions" => ClientVersions,
    "server-versions" => ServerVersions,
    "package" => Package,
    "known-flags" => KnownFlags,
    "flag-thresholds" => FlagThresholds,
    "params" => Params,
    "recommended-client-protocols" => RecommendedClientProtocols,
    "recommended-relay-protocols" => RecommendedRelayProtocols,
    "required-client-protocols" => RequiredClientProtocols,
    "required-relay-protocols" => RequiredRelayProtocols,
    "shared-rand-participate" => SharedRandParticipate,
    "shared-rand-commit" => SharedRandCommit,
    "shared-rand-previous-value" => SharedRandPreviousValue,
    "shared-rand-current-value" => SharedRandCurrentValue,
    "bandwidth-file-headers" => BandwidthFileHeaders,
    "bandwidth-file-digest" => BandwidthFileDigest,
    "dir-source" => DirSource,
    "vote-digest" => VoteDigest,
    "legacy-dir-key" => LegacyDirKey,
    "dir-options" => DirOptions,
    "r" => R,
    "s" => S,
    "v" => V,
    "pr" => Pr,
    "w" => W,
    "m" => M,
    "stats" => Stats,
    "directory-footer" => DirectoryFooter,
    "bandwidth-weights" => BandwidthWeights,
    "directory-signature" => DirectorySignature,

    // directory key certificates
    "dir-key-certificate-version" => DirKeyCertificateVersion,
    "dir-address" => DirAddress,
    "dir-identity-key" => DirIdentityKey,
    "dir-key-published" => DirKeyPublished,
    "dir-key-expires" => DirKeyExpires,
    "dir-signing-key" => DirSigningKey,
    "dir-key-crosscert" => DirKeyCrosscert,
    "dir-key-certification" => DirKeyCertification,

    // v1 directories
    "signed-directory" => SignedDirectory,
    "recommended-software" => RecommendedSoftware,
    "router-status" => RouterStatus,
    "running-routers" => RunningRouters,

    // bridge pool assignments
    "bridge-pool-assignment" => BridgePoolAssignment,

    // exit lists
    "Downloaded" => Downloaded,
    "ExitNode" => ExitNode,
    "Published" => ExitPublished,
    "LastStatus" => LastStatus,
    "ExitAddress" => ExitAddress,
}

impl Keyword {
    /// Return true if this is the `Unrecognized` sentinel.
    pub fn is_unrecognized(self) -> bool {
        self == Keyword::Unrecognized
    }
}

impl fmt::Display for Keyword {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(Keyword::from_token("router"), Keyword::Router);
        assert_eq!(Keyword::from_token("r"), Keyword::R);
        assert_eq!(Keyword::from_token("onion-key"), Keyword::OnionKey);
        assert_eq!(Keyword::from_token("ExitNode"), Keyword::ExitNode);
        assert_eq!(Keyword::from_token("router-bogus"), Keyword::Unrecognized);
        assert_eq!(Keyword::from_token(""), Keyword::Unrecognized);
    }

    #[test]
    fn test_tokens_are_case_sensitive() {
        assert_eq!(Keyword::from_token("published"), Keyword::Published);
        assert_eq!(Keyword::from_token("Published"), Keyword::ExitPublished);
        assert_eq!(Keyword::from_token("PUBLISHED"), Keyword::Unrecognized);
    }

    #[test]
    fn test_round_trip_names() {
        for kw in [
            Keyword::Router,
            Keyword::DirreqV3Ips,
            Keyword::NetworkStatusVersion,
            Keyword::ExitAddress,
            Keyword::P6,
        ] {
            assert_eq!(Keyword::from_token(kw.as_str()), kw);
        }
        assert_eq!(Keyword::Unrecognized.to_string(), "<unrecognized>");
        assert!(Keyword::from_token("nope").is_unrecognized());
    }

    #[test]
    fn test_ordering() {
        assert!(Keyword::Router < Keyword::Unrecognized);
        assert!(Keyword::Router < Keyword::IdentityEd25519);
    }
}
