/*!
Solidity interface of the deployed `VotingSystem` contract
*/

alloy::sol! {
    #[sol(all_derives)]
    interface VotingSystem {
        struct Candidate {
            string name;
            uint256 voteCount;
        }

        event ElectionCreated(
            uint256 indexed electionId,
            string name,
            uint256 startTime,
            uint256 endTime
        );
        event OfficeAdded(uint256 indexed electionId, uint256 officeIndex, string officeName);
        event CandidateAdded(
            uint256 indexed electionId,
            uint256 indexed officeIndex,
            uint256 candidateIndex,
            string candidateName
        );
        event VoteCast(
            uint256 indexed electionId,
            uint256 indexed officeIndex,
            uint256 candidateIndex,
            address voter
        );

        function electionCount() external view returns (uint256);
        function getElectionDetails(uint256 electionId)
            external
            view
            returns (
                string name,
                bool active,
                uint256 startTime,
                uint256 endTime,
                uint256 officeCount
            );
        function getCandidates(uint256 electionId, uint256 officeIndex)
            external
            view
            returns (Candidate[] memory);
        function hasRole(bytes32 role, address account) external view returns (bool);
        function viewAdmins() external view returns (address[] memory);
        function viewVoters() external view returns (address[] memory);

        function addAdmin(address account) external;
        function registerVoter(address voter) external;
        function createElection(string name, uint256 startTime, uint256 endTime) external;
        function updateElection(uint256 electionId, string name, uint256 startTime, uint256 endTime)
            external;
        function deleteElection(uint256 electionId) external;
        function endElection(uint256 electionId) external;
        function addOffice(uint256 electionId, string officeName) external;
        function addCandidate(uint256 electionId, uint256 officeIndex, string candidateName)
            external;
        function vote(uint256 electionId, uint256 officeIndex, uint256 candidateIndex) external;
    }
}
